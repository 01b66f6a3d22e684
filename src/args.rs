// 该文件是 Touxiang （头像） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use touxiang::{
  DetectorConfig, FromUrl,
  config::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HUMAN_CLASS_ID, DEFAULT_MAX_FACE_PERCENTAGE,
    DEFAULT_MIN_FACE_PERCENTAGE, DEFAULT_NMS_THRESHOLD,
  },
  model::ExecutionTarget,
};

/// 头像合格判定：单人、类别为人、人像面积占比在区间内
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// - darknet:///path/yolov3.cfg?weights=/path/yolov3.weights
  /// - rknn:///path/yolov3.rknn?classes=80
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源: image:///path/face.jpg 或 folder:///path/photos
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 合格图像的标注输出: image:///path/out.png 或 folder:///path/annotated
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 逐行 JSON 报告: report:///path/report.jsonl
  #[arg(long, value_name = "REPORT")]
  pub report: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 人像最小面积占比（百分比）
  #[arg(long, default_value_t = DEFAULT_MIN_FACE_PERCENTAGE, value_name = "PERCENT")]
  pub min_face_percentage: f64,

  /// 人像最大面积占比（百分比）
  #[arg(long, default_value_t = DEFAULT_MAX_FACE_PERCENTAGE, value_name = "PERCENT")]
  pub max_face_percentage: f64,

  /// "人" 的类别编号
  #[arg(long, default_value_t = DEFAULT_HUMAN_CLASS_ID, value_name = "ID")]
  pub human_class_id: u32,

  /// 推理设备: cpu, opencl, cuda, npu；覆盖模型地址中的 target
  #[arg(long, value_name = "TARGET")]
  pub target: Option<ExecutionTarget>,

  /// 生成 BGR 顺序的输入张量
  #[arg(long)]
  pub swap_rb: bool,

  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 标注字体文件，未指定时只画框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 最多处理的图像数
  #[arg(long, value_name = "COUNT")]
  pub max_images: Option<usize>,
}

impl Args {
  pub fn detector_config(&self) -> anyhow::Result<DetectorConfig> {
    let mut config = DetectorConfig::from_url(&self.model)?;
    if let Some(target) = self.target {
      config.target = target;
    }
    let settings = &mut config.settings;
    settings.confidence_threshold = self.confidence;
    settings.nms_threshold = self.nms_threshold;
    settings.min_face_percentage = self.min_face_percentage;
    settings.max_face_percentage = self.max_face_percentage;
    settings.human_class_id = self.human_class_id;
    settings.swap_rb = self.swap_rb;
    settings.validate()?;
    Ok(config)
  }
}
