// 该文件是 Touxiang （头像） 项目的一部分。
// src/model.rs - 推理后端
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

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::InputTensor, url_path};

#[cfg(feature = "backend_opencv")]
mod darknet;
#[cfg(feature = "backend_opencv")]
pub use self::darknet::{DarknetAdapter, DarknetAdapterError};

#[cfg(feature = "backend_rknpu")]
mod rknn;
#[cfg(feature = "backend_rknpu")]
pub use self::rknn::{RknnAdapter, RknnAdapterError};

/// 每行前 5 列: center_x, center_y, width, height, objectness
pub const BOX_COLUMNS: usize = 5;
pub const COCO_CLASS_NUM: usize = 80;

/// 推理后端的最小契约：输入固定形状的张量，按输出名返回原始输出表
pub trait InferenceAdapter {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 网络中未连接输出层的名称，即各个检测头
  fn output_names(&self) -> Vec<String>;

  fn forward(
    &self,
    tensor: &InputTensor,
    output_names: &[String],
  ) -> Result<Vec<RawOutput>, Self::Error>;
}

#[derive(Error, Debug, PartialEq)]
pub enum RawOutputError {
  #[error("输出 {name} 列数不足: 至少需要 {min} 列, 实际 {cols} 列")]
  TooFewColumns { name: String, cols: usize, min: usize },
  #[error("输出 {name} 数据长度 {len} 不能按 {cols} 列整除")]
  Ragged { name: String, len: usize, cols: usize },
}

/// 单个检测头的原始输出，行优先的二维表。
///
/// 每行是一个候选: `[cx, cy, w, h, objectness, class_0, class_1, ...]`，
/// 坐标相对输入张量尺寸归一化到 0..1。
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
  name: String,
  cols: usize,
  data: Box<[f32]>,
}

impl RawOutput {
  pub fn new(name: impl Into<String>, cols: usize, data: Vec<f32>) -> Result<Self, RawOutputError> {
    let name = name.into();
    if cols <= BOX_COLUMNS {
      return Err(RawOutputError::TooFewColumns {
        name,
        cols,
        min: BOX_COLUMNS + 1,
      });
    }
    if data.len() % cols != 0 {
      return Err(RawOutputError::Ragged {
        name,
        len: data.len(),
        cols,
      });
    }

    Ok(Self {
      name,
      cols,
      data: data.into_boxed_slice(),
    })
  }

  /// 由若干等长行构造
  pub fn from_rows<R: AsRef<[f32]>>(
    name: impl Into<String>,
    rows: &[R],
  ) -> Result<Self, RawOutputError> {
    let name = name.into();
    let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(BOX_COLUMNS + 1);
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in rows {
      let row = row.as_ref();
      if row.len() != cols {
        return Err(RawOutputError::Ragged {
          name,
          len: data.len() + row.len(),
          cols,
        });
      }
      data.extend_from_slice(row);
    }
    Self::new(name, cols, data)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn num_rows(&self) -> usize {
    self.data.len() / self.cols
  }

  pub fn num_classes(&self) -> usize {
    self.cols - BOX_COLUMNS
  }

  pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
    self.data.chunks_exact(self.cols)
  }
}

/// 推理设备，只影响性能，不影响输出数值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionTarget {
  #[default]
  Cpu,
  OpenCl,
  Cuda,
  Npu,
}

impl FromStr for ExecutionTarget {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(ExecutionTarget::Cpu),
      "opencl" => Ok(ExecutionTarget::OpenCl),
      "cuda" => Ok(ExecutionTarget::Cuda),
      "npu" => Ok(ExecutionTarget::Npu),
      other => Err(ModelError::UnknownTarget(other.to_string())),
    }
  }
}

impl fmt::Display for ExecutionTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ExecutionTarget::Cpu => "cpu",
      ExecutionTarget::OpenCl => "opencl",
      ExecutionTarget::Cuda => "cuda",
      ExecutionTarget::Npu => "npu",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("未知的推理设备: {0}")]
  UnknownTarget(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[cfg(feature = "backend_opencv")]
  #[error("Darknet 后端错误: {0}")]
  Darknet(#[from] DarknetAdapterError),
  #[cfg(feature = "backend_rknpu")]
  #[error("RKNN 后端错误: {0}")]
  Rknn(#[from] RknnAdapterError),
}

const DARKNET_SCHEME: &str = "darknet";
const RKNN_SCHEME: &str = "rknn";

/// 构造推理后端所需的模型文件
#[derive(Debug, Clone, PartialEq)]
pub enum ModelArtifacts {
  /// Darknet 网络定义（.cfg）与权重（.weights）
  Darknet {
    configuration: PathBuf,
    weights: PathBuf,
  },
  /// 已编译的 RKNN 模型，网络与权重在同一个文件里
  Rknn { model: PathBuf, num_classes: usize },
}

impl ModelArtifacts {
  pub fn darknet(
    configuration: impl Into<PathBuf>,
    weights: impl Into<PathBuf>,
  ) -> Result<Self, ModelError> {
    let configuration = configuration.into();
    let weights = weights.into();
    if configuration.as_os_str().is_empty() || weights.as_os_str().is_empty() {
      return Err(ModelError::ModelPathError(
        "模型配置与权重路径都不能为空".to_string(),
      ));
    }
    Ok(ModelArtifacts::Darknet {
      configuration,
      weights,
    })
  }

  pub fn rknn(model: impl Into<PathBuf>, num_classes: usize) -> Result<Self, ModelError> {
    let model = model.into();
    if model.as_os_str().is_empty() {
      return Err(ModelError::ModelPathError("RKNN 模型路径不能为空".to_string()));
    }
    if num_classes == 0 {
      return Err(ModelError::ModelPathError("类别数量必须大于 0".to_string()));
    }
    Ok(ModelArtifacts::Rknn { model, num_classes })
  }
}

impl FromUrl for ModelArtifacts {
  type Error = ModelError;

  /// `darknet:///path/yolov3.cfg?weights=/path/yolov3.weights`
  /// 或 `rknn:///path/yolov3.rknn?classes=80`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DARKNET_SCHEME => {
        let weights = url
          .query_pairs()
          .find(|(k, _)| k == "weights")
          .map(|(_, v)| v.into_owned())
          .unwrap_or_default();
        ModelArtifacts::darknet(url_path(url), weights)
      }
      RKNN_SCHEME => {
        let num_classes = match url.query_pairs().find(|(k, _)| k == "classes") {
          Some((_, v)) => v.parse::<usize>().map_err(|e| {
            ModelError::ModelPathError(format!("类别数量无效: {}, 错误: {}", v, e))
          })?,
          None => COCO_CLASS_NUM,
        };
        ModelArtifacts::rknn(url_path(url), num_classes)
      }
      other => Err(ModelError::SchemeMismatch(format!(
        "模型路径必须使用 {} 或 {} 方案, 实际为 {}",
        DARKNET_SCHEME, RKNN_SCHEME, other
      ))),
    }
  }
}

/// 从 URL 查询参数 `target=` 读取推理设备
pub fn target_from_url(url: &Url) -> Result<Option<ExecutionTarget>, ModelError> {
  url
    .query_pairs()
    .find(|(k, _)| k == "target")
    .map(|(_, v)| v.parse())
    .transpose()
}

/// 按编译特性选择后端
pub enum AdapterWrapper {
  #[cfg(feature = "backend_opencv")]
  Darknet(DarknetAdapter),
  #[cfg(feature = "backend_rknpu")]
  Rknn(RknnAdapter),
}

#[derive(Error, Debug)]
pub enum AdapterWrapperError {
  #[cfg(feature = "backend_opencv")]
  #[error("Darknet 推理错误: {0}")]
  Darknet(#[from] DarknetAdapterError),
  #[cfg(feature = "backend_rknpu")]
  #[error("RKNN 推理错误: {0}")]
  Rknn(#[from] RknnAdapterError),
}

impl AdapterWrapper {
  pub fn build(artifacts: &ModelArtifacts, target: ExecutionTarget) -> Result<Self, ModelError> {
    // 未启用任何后端时参数不会被使用
    let _ = target;
    match artifacts {
      #[cfg(feature = "backend_opencv")]
      ModelArtifacts::Darknet {
        configuration,
        weights,
      } => Ok(AdapterWrapper::Darknet(DarknetAdapter::new(
        configuration,
        weights,
        target,
      )?)),
      #[cfg(feature = "backend_rknpu")]
      ModelArtifacts::Rknn { model, num_classes } => Ok(AdapterWrapper::Rknn(RknnAdapter::new(
        model,
        *num_classes,
        target,
      )?)),
      #[allow(unreachable_patterns)]
      other => Err(ModelError::SchemeMismatch(format!(
        "当前构建未启用该模型的推理后端: {:?}",
        other
      ))),
    }
  }
}

impl InferenceAdapter for AdapterWrapper {
  type Error = AdapterWrapperError;

  fn output_names(&self) -> Vec<String> {
    match *self {
      #[cfg(feature = "backend_opencv")]
      AdapterWrapper::Darknet(ref adapter) => adapter.output_names(),
      #[cfg(feature = "backend_rknpu")]
      AdapterWrapper::Rknn(ref adapter) => adapter.output_names(),
    }
  }

  fn forward(
    &self,
    tensor: &InputTensor,
    output_names: &[String],
  ) -> Result<Vec<RawOutput>, Self::Error> {
    let _ = (tensor, output_names);
    match *self {
      #[cfg(feature = "backend_opencv")]
      AdapterWrapper::Darknet(ref adapter) => Ok(adapter.forward(tensor, output_names)?),
      #[cfg(feature = "backend_rknpu")]
      AdapterWrapper::Rknn(ref adapter) => Ok(adapter.forward(tensor, output_names)?),
    }
  }
}
