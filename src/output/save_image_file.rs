// 该文件是 Touxiang （头像） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detector::Analysis,
  input::ImageItem,
  label::LabelMap,
  output::{Render, draw::Draw},
  url_path,
};

const SAVE_FOLDER_SCHEME: &str = "folder";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

enum SaveTarget {
  /// 固定的输出文件
  File(PathBuf),
  /// 输出目录，沿用输入文件名
  Folder(PathBuf),
}

pub struct SaveImageFileOutput {
  target: SaveTarget,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    let path = PathBuf::from(url_path(uri));
    let target = if uri.scheme() == Self::SCHEME {
      SaveTarget::File(path)
    } else if uri.scheme() == SAVE_FOLDER_SCHEME {
      SaveTarget::Folder(path)
    } else {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}' 或 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        SAVE_FOLDER_SCHEME,
        uri.scheme()
      )));
    };

    Ok(SaveImageFileOutput {
      target,
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn accepts(scheme: &str) -> bool {
    scheme == Self::SCHEME || scheme == SAVE_FOLDER_SCHEME
  }

  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.draw = self.draw.with_labels(labels);
    self
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.draw = self.draw.with_font(font);
    self
  }

  /// 输入图像对应的输出路径
  pub fn destination(&self, item: &ImageItem) -> PathBuf {
    match &self.target {
      SaveTarget::File(path) => path.clone(),
      SaveTarget::Folder(directory) => directory.join(item.file_name()),
    }
  }

  fn save_image(&self, image: &RgbImage, path: &Path) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    let mut image = item.image.clone();
    self
      .draw
      .draw_detections_on_image(&mut image, &analysis.detections);
    self.save_image(&image, &self.destination(item))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::{BoundingBox, Detection, ValidationResult, Verdict};
  use image::Rgb;

  fn analysis() -> Analysis {
    Analysis {
      detections: vec![Detection {
        bbox: BoundingBox::new(1.0, 1.0, 6.0, 6.0),
        class_id: 0,
        confidence: 0.9,
      }],
      validation: ValidationResult {
        verdict: Verdict::Accepted,
        face_percentage: Some(36.0),
        class_id: Some(0),
      },
    }
  }

  fn item(dir: &Path) -> ImageItem {
    ImageItem {
      path: dir.join("input").join("face.png"),
      image: RgbImage::new(10, 10),
    }
  }

  #[test]
  fn folder_output_keeps_the_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("annotated");
    let url = Url::parse(&format!("folder://{}", out.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let item = item(dir.path());
    output.render_result(&item, &analysis()).unwrap();

    let saved = image::open(out.join("face.png")).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (10, 10));
    assert_eq!(*saved.get_pixel(1, 1), Rgb([0, 255, 0]));
    assert_eq!(*saved.get_pixel(4, 4), Rgb([0, 0, 0]));
    // 原图不被修改
    assert_eq!(*item.image.get_pixel(1, 1), Rgb([0, 0, 0]));
  }

  #[test]
  fn image_output_writes_a_fixed_path() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("result.png");
    let url = Url::parse(&format!("image://{}", target.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    output.render_result(&item(dir.path()), &analysis()).unwrap();
    assert!(target.is_file());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
    assert!(SaveImageFileOutput::accepts("folder"));
    assert!(!SaveImageFileOutput::accepts("report"));
  }
}
