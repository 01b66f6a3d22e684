// 该文件是 Touxiang （头像） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理后端
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::InputTensor,
  model::{BOX_COLUMNS, ExecutionTarget, InferenceAdapter, RawOutput, RawOutputError},
};

const RKNN_NUM_INPUTS: u32 = 1;

#[derive(Error, Debug)]
pub enum RknnAdapterError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("输出格式错误: {0}")]
  OutputError(#[from] RawOutputError),
  #[error("未知的输出名称: {0}")]
  UnknownOutput(String),
  #[error("推理上下文已损坏")]
  Poisoned,
}

impl RknnAdapterError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnAdapterError::ModelInvalid(msg.to_string(), e)
  }
}

/// 在 RKNPU 上运行的 YOLO 模型。
///
/// 模型导出时需保留行格式的检测头输出 `(N, 5 + classes)`。
pub struct RknnAdapter {
  context: Mutex<Context>,
  num_classes: usize,
  output_names: Vec<String>,
}

impl RknnAdapter {
  pub fn new(
    model_path: &Path,
    num_classes: usize,
    target: ExecutionTarget,
  ) -> Result<Self, RknnAdapterError> {
    if target != ExecutionTarget::Npu && target != ExecutionTarget::Cpu {
      warn!("RKNN 后端忽略推理设备 {}", target);
    }

    info!("加载模型文件: {}", model_path.display());
    let model_data = std::fs::read(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnAdapterError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnAdapterError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnAdapterError::invalid("无法获取输出数量", e))?;

    if num_inputs != RKNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      return Err(RknnAdapterError::invalid(
        &format!(
          "预期模型输入数量为 {}, 实际为 {}",
          RKNN_NUM_INPUTS, num_inputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    let output_names = (0..num_outputs).map(|i| format!("output{}", i)).collect();
    debug!("模型输出数量: {}", num_outputs);
    info!("模型加载完成");

    Ok(Self {
      context: Mutex::new(context),
      num_classes,
      output_names,
    })
  }
}

impl InferenceAdapter for RknnAdapter {
  type Error = RknnAdapterError;

  fn output_names(&self) -> Vec<String> {
    self.output_names.clone()
  }

  fn forward(
    &self,
    tensor: &InputTensor,
    output_names: &[String],
  ) -> Result<Vec<RawOutput>, Self::Error> {
    let bytes: Vec<u8> = tensor
      .as_slice()
      .iter()
      .flat_map(|v| v.to_ne_bytes())
      .collect();

    let context = self.context.lock().map_err(|_| RknnAdapterError::Poisoned)?;

    debug!("设置模型输入");
    context.set_input(0, &bytes, TensorFormat::NCHW, TensorType::Float32)?;

    debug!("执行模型推理");
    context.run()?;

    debug!("获取模型输出");
    let output = context.get_outputs()?;

    let cols = BOX_COLUMNS + self.num_classes;
    let mut results = Vec::with_capacity(output_names.len());
    for name in output_names {
      let idx = self
        .output_names
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| RknnAdapterError::UnknownOutput(name.clone()))?;
      let data = output.get_f32(idx)?;
      debug!("输出 {}: {} 个数值", name, data.len());
      results.push(RawOutput::new(name.clone(), cols, data.to_vec())?);
    }

    Ok(results)
  }
}
