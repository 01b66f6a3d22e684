// 该文件是 Touxiang （头像） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use thiserror::Error;
use tracing::debug;

use crate::{detector::Detection, label::LabelMap};

const LABEL_FONT_SIZE: f32 = 20.0;
// 标签文字底边与框顶的距离
const LABEL_OFFSET: i32 = 5;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

#[derive(Error, Debug)]
pub enum FontError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 从文件加载标注字体
pub fn load_font(path: &Path) -> Result<FontVec, FontError> {
  let data = std::fs::read(path)?;
  let font = FontVec::try_from_vec(data)?;
  debug!("加载字体: {}", path.display());
  Ok(font)
}

/// 在原图上画出检测框，有字体时附带 "<类别> Confidence: <置信度>" 标签
pub struct Draw {
  labels: LabelMap,
  font: Option<FontVec>,
  font_size: f32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      labels: LabelMap::default(),
      font: None,
      font_size: LABEL_FONT_SIZE,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn label_text(&self, detection: &Detection) -> String {
    format!(
      "{} Confidence: {:.2}",
      self.labels.name(detection.class_id),
      detection.confidence
    )
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection);
    }
  }

  // 框坐标只在绘制时裁剪到图像内
  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let bbox = &detection.bbox;
    let x_min = (bbox.x as i32).clamp(0, w - 1);
    let y_min = (bbox.y as i32).clamp(0, h - 1);
    let x_max = ((bbox.x + bbox.width) as i32).clamp(0, w - 1);
    let y_max = ((bbox.y + bbox.height) as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(self.color);
    for thickness in 0..BOX_THICKNESS {
      let x_min_t = (x_min + thickness).min(x_max) as u32;
      let y_min_t = (y_min + thickness).min(y_max) as u32;
      let x_max_t = (x_max - thickness).max(x_min) as u32;
      let y_max_t = (y_max - thickness).max(y_min) as u32;

      for x in x_min_t..=x_max_t {
        image.put_pixel(x, y_min_t, color);
        image.put_pixel(x, y_max_t, color);
      }
      for y in y_min_t..=y_max_t {
        image.put_pixel(x_min_t, y, color);
        image.put_pixel(x_max_t, y, color);
      }
    }

    if let Some(font) = &self.font {
      let label = self.label_text(detection);
      let scale = PxScale::from(self.font_size);
      let label_y = (y_min - LABEL_OFFSET - self.font_size as i32).max(0);
      draw_text_mut(image, color, x_min, label_y, scale, font, &label);
    }
  }
}
