// 该文件是 Touxiang （头像） 项目的一部分。
// src/frame.rs - NCHW 张量定义
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

pub const RGB_CHANNELS: usize = 3;
pub const INPUT_WIDTH: u32 = 416;
pub const INPUT_HEIGHT: u32 = 416;

/// 检测网络的输入张量: (1, 3, 416, 416)
pub type InputTensor = NchwTensor<INPUT_WIDTH, INPUT_HEIGHT>;

#[derive(Error, Debug)]
#[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct TensorShapeError {
  pub expected: usize,
  pub actual: usize,
}

/// batch 固定为 1 的 NCHW 浮点张量，三个通道平面依次存放
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NchwTensor<W, H> {
  const LEN: usize = RGB_CHANNELS * (W as usize) * (H as usize);

  /// `[N, C, H, W]`
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 第 `c` 个通道平面
  pub fn plane(&self, c: usize) -> &[f32] {
    let plane_size = (W as usize) * (H as usize);
    &self.data[c * plane_size..(c + 1) * plane_size]
  }

  pub fn get(&self, c: usize, y: usize, x: usize) -> f32 {
    self.data[c * (H as usize) * (W as usize) + y * (W as usize) + x]
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for NchwTensor<W, H> {
  type Error = TensorShapeError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(TensorShapeError {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for NchwTensor<W, H> {
  fn default() -> Self {
    Self {
      data: vec![0.0f32; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for NchwTensor<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsRef<[f32]> for NchwTensor<W, H> {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_tensor_is_black() {
    let tensor = NchwTensor::<4, 2>::default();
    assert_eq!(tensor.shape(), [1, 3, 2, 4]);
    assert_eq!(tensor.as_slice().len(), 24);
    assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
  }

  #[test]
  fn rejects_wrong_length() {
    let err = NchwTensor::<2, 2>::try_from(vec![0.0; 11]).unwrap_err();
    assert_eq!(err.expected, 12);
    assert_eq!(err.actual, 11);
  }

  #[test]
  fn indexes_planes_in_nchw_order() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let tensor = NchwTensor::<2, 2>::try_from(data).unwrap();
    assert_eq!(tensor.plane(1), &[4.0, 5.0, 6.0, 7.0]);
    assert_eq!(tensor.get(2, 1, 0), 10.0);
    assert_eq!(tensor.get(0, 0, 1), 1.0);
  }
}
