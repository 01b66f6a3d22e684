// 该文件是 Touxiang （头像） 项目的一部分。
// src/model/darknet.rs - OpenCV DNN 加载 Darknet 模型
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

use std::{path::Path, sync::Mutex};

use opencv::{
  core::{CV_32F, Mat, Scalar, Vector},
  dnn,
  prelude::*,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::InputTensor,
  model::{ExecutionTarget, InferenceAdapter, RawOutput, RawOutputError},
};

#[derive(Error, Debug)]
pub enum DarknetAdapterError {
  #[error("模型文件不存在: {0}")]
  MissingFile(String),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, opencv::Error),
  #[error("OpenCV 错误: {0}")]
  OpenCvError(#[from] opencv::Error),
  #[error("输出格式错误: {0}")]
  OutputError(#[from] RawOutputError),
  #[error("推理上下文已损坏")]
  Poisoned,
}

/// Darknet YOLO 网络，由 `.cfg` 与 `.weights` 两个文件构造
pub struct DarknetAdapter {
  net: Mutex<dnn::Net>,
  output_names: Vec<String>,
}

fn path_str(path: &Path) -> Result<&str, DarknetAdapterError> {
  if !path.is_file() {
    return Err(DarknetAdapterError::MissingFile(path.display().to_string()));
  }
  path
    .to_str()
    .ok_or_else(|| DarknetAdapterError::MissingFile(path.display().to_string()))
}

fn backend_and_target(target: ExecutionTarget) -> (i32, i32) {
  match target {
    ExecutionTarget::Cpu => (dnn::DNN_BACKEND_OPENCV, dnn::DNN_TARGET_CPU),
    ExecutionTarget::OpenCl => (dnn::DNN_BACKEND_OPENCV, dnn::DNN_TARGET_OPENCL),
    ExecutionTarget::Cuda => (dnn::DNN_BACKEND_CUDA, dnn::DNN_TARGET_CUDA),
    ExecutionTarget::Npu => {
      warn!("OpenCV 后端不支持 NPU, 回退到 CPU");
      (dnn::DNN_BACKEND_OPENCV, dnn::DNN_TARGET_CPU)
    }
  }
}

impl DarknetAdapter {
  pub fn new(
    configuration: &Path,
    weights: &Path,
    target: ExecutionTarget,
  ) -> Result<Self, DarknetAdapterError> {
    info!(
      "加载 Darknet 模型: 配置 {}, 权重 {}",
      configuration.display(),
      weights.display()
    );
    let mut net = dnn::read_net_from_darknet(path_str(configuration)?, path_str(weights)?)
      .map_err(|e| {
        error!("无法读取 Darknet 模型: {}", e);
        DarknetAdapterError::ModelInvalid("无法读取 Darknet 模型".to_string(), e)
      })?;

    let (backend, device) = backend_and_target(target);
    net.set_preferable_backend(backend)?;
    net.set_preferable_target(device)?;
    debug!("推理设备: {}", target);

    let output_names: Vec<String> = net.get_unconnected_out_layers_names()?.to_vec();
    debug!("模型输出层: {:?}", output_names);
    info!("模型加载完成");

    Ok(Self {
      net: Mutex::new(net),
      output_names,
    })
  }
}

impl InferenceAdapter for DarknetAdapter {
  type Error = DarknetAdapterError;

  fn output_names(&self) -> Vec<String> {
    self.output_names.clone()
  }

  fn forward(
    &self,
    tensor: &InputTensor,
    output_names: &[String],
  ) -> Result<Vec<RawOutput>, Self::Error> {
    let shape = tensor.shape().map(|d| d as i32);
    let mut blob = Mat::new_nd_with_default(&shape, CV_32F, Scalar::all(0.0))?;
    blob
      .data_typed_mut::<f32>()?
      .copy_from_slice(tensor.as_slice());

    let names: Vector<String> = output_names.iter().cloned().collect();
    let mut outs = Vector::<Mat>::new();
    {
      let mut net = self.net.lock().map_err(|_| DarknetAdapterError::Poisoned)?;
      net.set_input(&blob, "", 1.0, Scalar::default())?;
      net.forward(&mut outs, &names)?;
    }

    outs
      .iter()
      .zip(output_names)
      .map(|(mat, name)| {
        let cols = mat.cols() as usize;
        let data = mat.data_typed::<f32>()?.to_vec();
        debug!("输出 {}: {}x{}", name, mat.rows(), cols);
        Ok(RawOutput::new(name.clone(), cols, data)?)
      })
      .collect()
  }
}
