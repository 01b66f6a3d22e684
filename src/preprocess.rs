// 该文件是 Touxiang （头像） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{INPUT_HEIGHT, INPUT_WIDTH, InputTensor, NchwTensor, RGB_CHANNELS};

const PIXEL_SCALE: f32 = 1.0 / 255.0;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

/// 把解码后的 RGB 图像转换为检测网络的输入张量。
///
/// 图像被直接拉伸到 416x416（不保持宽高比，也不做 letterbox），
/// 像素值乘以 1/255 映射到 `[0, 1]`。
///
/// `image` 解码出的像素是 RGB 顺序，Darknet YOLO 同样以 RGB 输入，
/// 因此 `swap_rb` 默认关闭；打开后输出 BGR 顺序的张量。
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
  pub swap_rb: bool,
}

impl Preprocessor {
  pub fn new(swap_rb: bool) -> Self {
    Self { swap_rb }
  }

  pub fn preprocess(&self, image: &RgbImage) -> Result<InputTensor, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PreprocessError::InvalidImage { width, height });
    }

    debug!(
      "预处理图像: {}x{} -> {}x{}, 交换 R/B: {}",
      width, height, INPUT_WIDTH, INPUT_HEIGHT, self.swap_rb
    );

    let resized = if (width, height) == (INPUT_WIDTH, INPUT_HEIGHT) {
      image.clone()
    } else {
      image::imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle)
    };

    Ok(self.to_tensor(&resized))
  }

  fn to_tensor(&self, resized: &RgbImage) -> InputTensor {
    let mut tensor = NchwTensor::default();
    let plane_size = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
    let slice = tensor.as_mut();

    for (idx, pixel) in resized.pixels().enumerate() {
      for c in 0..RGB_CHANNELS {
        let source = if self.swap_rb { RGB_CHANNELS - 1 - c } else { c };
        slice[c * plane_size + idx] = pixel[source] as f32 * PIXEL_SCALE;
      }
    }

    tensor
  }
}

/// 使用默认通道顺序（RGB）预处理
pub fn preprocess(image: &RgbImage) -> Result<InputTensor, PreprocessError> {
  Preprocessor::default().preprocess(image)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn rejects_zero_sized_image() {
    let image = RgbImage::new(0, 10);
    assert!(matches!(
      preprocess(&image),
      Err(PreprocessError::InvalidImage {
        width: 0,
        height: 10
      })
    ));
  }

  #[test]
  fn scales_pixels_into_unit_range() {
    let image = RgbImage::from_pixel(INPUT_WIDTH, INPUT_HEIGHT, Rgb([255, 0, 51]));
    let tensor = preprocess(&image).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 416, 416]);
    assert!(tensor.plane(0).iter().all(|&v| (v - 1.0).abs() < 1e-6));
    assert!(tensor.plane(1).iter().all(|&v| v == 0.0));
    assert!(tensor.plane(2).iter().all(|&v| (v - 0.2).abs() < 1e-6));
  }

  #[test]
  fn swap_rb_reverses_channel_planes() {
    let image = RgbImage::from_pixel(INPUT_WIDTH, INPUT_HEIGHT, Rgb([255, 128, 0]));
    let tensor = Preprocessor::new(true).preprocess(&image).unwrap();
    assert_eq!(tensor.get(0, 0, 0), 0.0);
    assert!((tensor.get(1, 10, 10) - 128.0 / 255.0).abs() < 1e-6);
    assert!((tensor.get(2, 415, 415) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn stretches_non_square_images_without_letterbox() {
    // 纯色图像拉伸后每个位置仍是同一颜色，说明没有填充边
    let image = RgbImage::from_pixel(100, 20, Rgb([10, 20, 30]));
    let tensor = preprocess(&image).unwrap();
    for (c, expected) in [10.0f32, 20.0, 30.0].into_iter().enumerate() {
      let expected = expected / 255.0;
      assert!(tensor.plane(c).iter().all(|&v| (v - expected).abs() < 1e-5));
    }
  }

  #[test]
  fn black_image_gives_all_zero_tensor() {
    let image = RgbImage::new(640, 480);
    let tensor = preprocess(&image).unwrap();
    assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
  }
}
