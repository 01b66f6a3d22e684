// 该文件是 Touxiang （头像） 项目的一部分。
// src/output.rs - 输出定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;
use url::Url;

use crate::{FromUrl, detector::Analysis, input::ImageItem, label::LabelMap};
#[cfg(feature = "json_report")]
use crate::FromUrlWithScheme;

pub trait Render {
  type Error;
  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error>;
}

impl<R: Render + ?Sized> Render for &R {
  type Error = R::Error;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    (**self).render_result(item, analysis)
  }
}

impl<R: Render + ?Sized> Render for Box<R> {
  type Error = R::Error;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    (**self).render_result(item, analysis)
  }
}

impl<R: Render> Render for Vec<R> {
  type Error = R::Error;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    for output in self {
      output.render_result(item, analysis)?;
    }
    Ok(())
  }
}

/// 只输出判定合格的图像
pub struct AcceptedOnly<R>(pub R);

impl<R: Render> Render for AcceptedOnly<R> {
  type Error = R::Error;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    if analysis.validation.is_valid() {
      self.0.render_result(item, analysis)
    } else {
      Ok(())
    }
  }
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "json_report")]
mod json_report;
#[cfg(feature = "json_report")]
pub use self::json_report::{JsonReportError, JsonReportOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "json_report")]
  #[error("检测报告输出错误: {0}")]
  JsonReportError(#[from] JsonReportError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "json_report")]
  JsonReportOutput(JsonReportOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "save_image_file")]
    if SaveImageFileOutput::accepts(url.scheme()) {
      let output = SaveImageFileOutput::from_url(url)?;
      return Ok(OutputWrapper::SaveImageFileOutput(output));
    }
    #[cfg(feature = "json_report")]
    if url.scheme() == JsonReportOutput::SCHEME {
      let output = JsonReportOutput::from_url(url)?;
      return Ok(OutputWrapper::JsonReportOutput(output));
    }
    Err(OutputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl OutputWrapper {
  /// 替换标注与报告中使用的类别名称
  pub fn with_labels(self, labels: LabelMap) -> Self {
    let _ = &labels;
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_labels(labels))
      }
      #[cfg(feature = "json_report")]
      OutputWrapper::JsonReportOutput(output) => {
        OutputWrapper::JsonReportOutput(output.with_labels(labels))
      }
    }
  }

  /// 设置标注字体，对报告输出无效
  #[cfg(feature = "save_image_file")]
  pub fn with_font(self, font: ab_glyph::FontVec) -> Self {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_font(font))
      }
      #[allow(unreachable_patterns)]
      other => other,
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    let _ = (item, analysis);
    match *self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(ref output) => output
        .render_result(item, analysis)
        .map_err(OutputError::from),
      #[cfg(feature = "json_report")]
      OutputWrapper::JsonReportOutput(ref output) => output
        .render_result(item, analysis)
        .map_err(OutputError::from),
    }
  }
}
