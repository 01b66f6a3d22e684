// 该文件是 Touxiang （头像） 项目的一部分。
// src/detector.rs - 头像检测流水线
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, DetectionSettings, DetectorConfig},
  model::{AdapterWrapper, InferenceAdapter, ModelError},
  preprocess::{PreprocessError, Preprocessor},
};

mod decode;
mod nms;
mod validate;

pub use self::decode::decode;
pub use self::nms::suppress;
pub use self::validate::{ProfileRule, ValidationResult, Verdict, is_valid_profile_picture};

/// 图像像素坐标系下的轴对齐矩形，不裁剪到图像边界
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
  /// 左上角 x，可能为负
  pub x: f32,
  /// 左上角 y，可能为负
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }
}

/// 抑制前的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BoundingBox,
  pub class_id: u32,
  pub confidence: f32,
}

/// 经过置信度过滤与重叠抑制后保留的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub class_id: u32,
  pub confidence: f32,
}

impl From<Candidate> for Detection {
  fn from(candidate: Candidate) -> Self {
    Detection {
      bbox: candidate.bbox,
      class_id: candidate.class_id,
      confidence: candidate.confidence,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("图像无效: {0}")]
  InvalidImage(String),
  #[error("模型初始化失败: {0}")]
  ModelInitialization(#[from] ModelError),
  #[error("配置无效: {0}")]
  InvalidConfig(#[from] ConfigError),
  #[error("推理失败: {0}")]
  Inference(Box<dyn std::error::Error + Send + Sync>),
  #[error("模型输出数量不匹配: 请求 {expected} 个, 实际 {actual} 个")]
  MalformedOutput { expected: usize, actual: usize },
}

impl From<PreprocessError> for DetectorError {
  fn from(err: PreprocessError) -> Self {
    DetectorError::InvalidImage(err.to_string())
  }
}

/// 一次检测的完整结果
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
  pub detections: Vec<Detection>,
  pub validation: ValidationResult,
}

/// 检测并判定头像是否合格。
///
/// 除推理后端外不持有可变状态，`A: Sync` 时可在多个线程间共享。
pub struct ProfileDetector<A> {
  adapter: A,
  output_names: Vec<String>,
  preprocessor: Preprocessor,
  confidence_threshold: f32,
  nms_threshold: f32,
  rule: ProfileRule,
}

impl ProfileDetector<AdapterWrapper> {
  /// 按配置加载模型并构造检测器
  pub fn from_config(config: &DetectorConfig) -> Result<Self, DetectorError> {
    config.settings.validate()?;
    info!("初始化检测器, 推理设备: {}", config.target);
    let adapter = AdapterWrapper::build(&config.model, config.target)?;
    Self::new(adapter, &config.settings)
  }
}

impl<A: InferenceAdapter> ProfileDetector<A> {
  pub fn new(adapter: A, settings: &DetectionSettings) -> Result<Self, DetectorError> {
    settings.validate()?;
    let output_names = adapter.output_names();
    debug!("检测头输出: {:?}", output_names);

    Ok(Self {
      adapter,
      output_names,
      preprocessor: Preprocessor::new(settings.swap_rb),
      confidence_threshold: settings.confidence_threshold,
      nms_threshold: settings.nms_threshold,
      rule: ProfileRule {
        min_face_percentage: settings.min_face_percentage,
        max_face_percentage: settings.max_face_percentage,
        human_class_id: settings.human_class_id,
      },
    })
  }

  pub fn adapter(&self) -> &A {
    &self.adapter
  }

  pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    debug!("开始目标检测");
    let tensor = self.preprocessor.preprocess(image)?;

    debug!("执行前向推理");
    let outputs = self
      .adapter
      .forward(&tensor, &self.output_names)
      .map_err(|e| DetectorError::Inference(Box::new(e)))?;
    if outputs.len() != self.output_names.len() {
      return Err(DetectorError::MalformedOutput {
        expected: self.output_names.len(),
        actual: outputs.len(),
      });
    }

    let (width, height) = image.dimensions();
    let candidates = decode(&outputs, width, height, self.confidence_threshold);
    debug!("解码得到 {} 个候选框", candidates.len());

    let detections = suppress(candidates, self.confidence_threshold, self.nms_threshold);
    info!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }

  pub fn analyze(&self, image: &RgbImage) -> Result<Analysis, DetectorError> {
    let detections = self.detect(image)?;
    let (width, height) = image.dimensions();
    let validation = self.rule.validate(&detections, width, height);
    Ok(Analysis {
      detections,
      validation,
    })
  }

  pub fn validate(&self, image: &RgbImage) -> Result<ValidationResult, DetectorError> {
    Ok(self.analyze(image)?.validation)
  }

  pub fn is_valid_profile_picture(&self, image: &RgbImage) -> Result<bool, DetectorError> {
    Ok(self.validate(image)?.is_valid())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::InputTensor,
    model::{RawOutput, RawOutputError},
  };

  struct FixedAdapter {
    rows: Vec<Vec<f32>>,
    heads: usize,
  }

  impl InferenceAdapter for FixedAdapter {
    type Error = RawOutputError;

    fn output_names(&self) -> Vec<String> {
      (0..self.heads).map(|i| format!("yolo_{}", i)).collect()
    }

    fn forward(
      &self,
      _tensor: &InputTensor,
      output_names: &[String],
    ) -> Result<Vec<RawOutput>, Self::Error> {
      output_names
        .iter()
        .take(1)
        .map(|name| RawOutput::from_rows(name.clone(), &self.rows))
        .collect()
    }
  }

  fn row(cx: f32, cy: f32, w: f32, h: f32, scores: [f32; 2]) -> Vec<f32> {
    vec![cx, cy, w, h, 1.0, scores[0], scores[1]]
  }

  #[test]
  fn detects_and_validates_a_single_person() {
    let adapter = FixedAdapter {
      rows: vec![row(0.5, 0.5, 0.9, 0.9, [0.95, 0.1])],
      heads: 1,
    };
    let detector = ProfileDetector::new(adapter, &DetectionSettings::default()).unwrap();
    let image = RgbImage::new(100, 100);

    let analysis = detector.analyze(&image).unwrap();
    assert_eq!(analysis.detections.len(), 1);
    assert_eq!(analysis.validation.verdict, Verdict::Accepted);
    assert!(detector.is_valid_profile_picture(&image).unwrap());
  }

  #[test]
  fn missing_head_output_is_an_error() {
    let adapter = FixedAdapter {
      rows: vec![row(0.5, 0.5, 0.9, 0.9, [0.95, 0.1])],
      heads: 3,
    };
    let detector = ProfileDetector::new(adapter, &DetectionSettings::default()).unwrap();
    assert!(matches!(
      detector.detect(&RgbImage::new(10, 10)),
      Err(DetectorError::MalformedOutput {
        expected: 3,
        actual: 1
      })
    ));
  }

  #[test]
  fn zero_sized_image_is_invalid() {
    let adapter = FixedAdapter {
      rows: vec![],
      heads: 1,
    };
    let detector = ProfileDetector::new(adapter, &DetectionSettings::default()).unwrap();
    assert!(matches!(
      detector.detect(&RgbImage::new(0, 0)),
      Err(DetectorError::InvalidImage(_))
    ));
  }

  #[test]
  fn invalid_settings_are_rejected_at_construction() {
    let adapter = FixedAdapter {
      rows: vec![],
      heads: 1,
    };
    let settings = DetectionSettings {
      confidence_threshold: f32::NAN,
      ..Default::default()
    };
    assert!(matches!(
      ProfileDetector::new(adapter, &settings),
      Err(DetectorError::InvalidConfig(_))
    ));
  }

  #[cfg(not(any(feature = "backend_opencv", feature = "backend_rknpu")))]
  #[test]
  fn from_config_without_a_backend_fails() {
    use crate::model::ModelArtifacts;

    let model = ModelArtifacts::darknet("yolov3.cfg", "yolov3.weights").unwrap();
    let config = DetectorConfig::new(model);
    assert!(matches!(
      ProfileDetector::from_config(&config),
      Err(DetectorError::ModelInitialization(_))
    ));
  }
}
