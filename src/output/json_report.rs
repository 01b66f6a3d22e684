// 该文件是 Touxiang （头像） 项目的一部分。
// src/output/json_report.rs - 逐行 JSON 检测报告
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

use std::{
  fs::{File, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, detector::Analysis, input::ImageItem, label::LabelMap,
  output::Render, url_path,
};

#[derive(Error, Debug)]
pub enum JsonReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("报告文件锁已损坏")]
  Poisoned,
}

/// 每幅图像追加一行 JSON 记录
pub struct JsonReportOutput {
  path: PathBuf,
  file: Mutex<File>,
  labels: LabelMap,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "report";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportError::SchemeMismatch(format!(
        "期望报告方式 '{}', 实际 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }
    Self::open(PathBuf::from(url_path(uri)))
  }
}

impl JsonReportOutput {
  pub fn open(path: PathBuf) -> Result<Self, JsonReportError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    debug!("检测报告写入: {}", path.display());
    Ok(Self {
      path,
      file: Mutex::new(file),
      labels: LabelMap::default(),
    })
  }

  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn record(&self, item: &ImageItem, analysis: &Analysis) -> Value {
    let detections: Vec<Value> = analysis
      .detections
      .iter()
      .map(|d| {
        json!({
          "class_id": d.class_id,
          "label": self.labels.name(d.class_id),
          "confidence": d.confidence,
          "box": [d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height],
        })
      })
      .collect();

    let validation = &analysis.validation;
    json!({
      "timestamp": Utc::now().to_rfc3339(),
      "path": item.path.display().to_string(),
      "width": item.image.width(),
      "height": item.image.height(),
      "valid": validation.is_valid(),
      "verdict": validation.verdict.to_string(),
      "face_percentage": validation.face_percentage,
      "class_id": validation.class_id,
      "detections": detections,
    })
  }
}

impl Render for JsonReportOutput {
  type Error = JsonReportError;

  fn render_result(&self, item: &ImageItem, analysis: &Analysis) -> Result<(), Self::Error> {
    let line = serde_json::to_string(&self.record(item, analysis))?;
    let mut file = self.file.lock().map_err(|_| JsonReportError::Poisoned)?;
    writeln!(file, "{}", line)?;
    file.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::{BoundingBox, Detection, ValidationResult, Verdict};
  use image::RgbImage;

  fn item() -> ImageItem {
    ImageItem {
      path: PathBuf::from("/photos/cat.jpg"),
      image: RgbImage::new(100, 50),
    }
  }

  #[test]
  fn appends_one_line_per_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.jsonl");
    let url = Url::parse(&format!("report://{}", path.display())).unwrap();
    let report = JsonReportOutput::from_url(&url).unwrap();

    let rejected = Analysis {
      detections: vec![Detection {
        bbox: BoundingBox::new(10.0, 5.0, 80.0, 40.0),
        class_id: 15,
        confidence: 0.75,
      }],
      validation: ValidationResult {
        verdict: Verdict::NotHuman,
        face_percentage: Some(64.0),
        class_id: Some(15),
      },
    };
    let empty = Analysis {
      detections: Vec::new(),
      validation: ValidationResult {
        verdict: Verdict::WrongFaceCount(0),
        face_percentage: None,
        class_id: None,
      },
    };
    report.render_result(&item(), &rejected).unwrap();
    report.render_result(&item(), &empty).unwrap();

    let content = std::fs::read_to_string(report.path()).unwrap();
    let lines: Vec<Value> = content
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["path"], "/photos/cat.jpg");
    assert_eq!(lines[0]["valid"], false);
    assert_eq!(lines[0]["verdict"], "not_human");
    assert_eq!(lines[0]["face_percentage"], 64.0);
    assert_eq!(lines[0]["detections"][0]["label"], "cat");
    assert_eq!(lines[0]["detections"][0]["box"][2], 80.0);

    assert_eq!(lines[1]["verdict"], "wrong_face_count");
    assert!(lines[1]["face_percentage"].is_null());
    assert_eq!(lines[1]["detections"].as_array().unwrap().len(), 0);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("image:///tmp/out.png").unwrap();
    assert!(matches!(
      JsonReportOutput::from_url(&url),
      Err(JsonReportError::SchemeMismatch(_))
    ));
  }
}
