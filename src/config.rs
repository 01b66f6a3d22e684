// 该文件是 Touxiang （头像） 项目的一部分。
// src/config.rs - 检测器配置
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

use crate::{
  FromUrl,
  model::{ExecutionTarget, ModelArtifacts, ModelError, target_from_url},
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_MIN_FACE_PERCENTAGE: f64 = 70.0;
pub const DEFAULT_MAX_FACE_PERCENTAGE: f64 = 90.0;
pub const DEFAULT_HUMAN_CLASS_ID: u32 = 0;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("{name} 必须是有限数值, 实际为 {value}")]
  NotFinite { name: &'static str, value: f64 },
}

/// 检测与验证参数，检测器构造后不可修改
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
  /// 类别分数必须严格大于该值才保留
  pub confidence_threshold: f32,
  /// 与已保留框的 IoU 大于该值时被抑制
  pub nms_threshold: f32,
  /// 人像框面积占整幅图像的最小百分比（含）
  pub min_face_percentage: f64,
  /// 人像框面积占整幅图像的最大百分比（含）
  pub max_face_percentage: f64,
  pub human_class_id: u32,
  /// 为 true 时输入张量按 BGR 排列
  pub swap_rb: bool,
}

impl Default for DetectionSettings {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      min_face_percentage: DEFAULT_MIN_FACE_PERCENTAGE,
      max_face_percentage: DEFAULT_MAX_FACE_PERCENTAGE,
      human_class_id: DEFAULT_HUMAN_CLASS_ID,
      swap_rb: false,
    }
  }
}

impl DetectionSettings {
  /// 只拒绝非有限数值。分数按原始数值比较，可以不在 [0, 1] 内；
  /// 最小占比大于最大占比时所有图像都不合格。
  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence_threshold", f64::from(self.confidence_threshold)),
      ("nms_threshold", f64::from(self.nms_threshold)),
      ("min_face_percentage", self.min_face_percentage),
      ("max_face_percentage", self.max_face_percentage),
    ] {
      if !value.is_finite() {
        return Err(ConfigError::NotFinite { name, value });
      }
    }
    Ok(())
  }
}

/// 构造完整检测器所需的全部配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub model: ModelArtifacts,
  pub target: ExecutionTarget,
  pub settings: DetectionSettings,
}

impl DetectorConfig {
  pub fn new(model: ModelArtifacts) -> Self {
    Self {
      model,
      target: ExecutionTarget::default(),
      settings: DetectionSettings::default(),
    }
  }
}

impl FromUrl for DetectorConfig {
  type Error = ModelError;

  /// 模型 URL 可带 `target=` 查询参数，其余设置取默认值
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let model = ModelArtifacts::from_url(url)?;
    let target = target_from_url(url)?.unwrap_or_default();
    Ok(Self {
      target,
      ..Self::new(model)
    })
  }
}
