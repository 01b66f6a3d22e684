// 该文件是 Touxiang （头像） 项目的一部分。
// src/main.rs - 批量头像判定程序
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

mod args;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use touxiang::{
  FromUrl, ProfileDetector,
  input::ImageFileInput,
  label::LabelMap,
  output::{AcceptedOnly, OutputError, OutputWrapper, Render},
  task::{BatchTask, Task},
};

#[cfg(feature = "save_image_file")]
fn with_font(output: OutputWrapper, font: Option<&Path>) -> Result<OutputWrapper> {
  match font {
    Some(path) => {
      let font = touxiang::output::draw::load_font(path)
        .with_context(|| format!("无法加载字体: {}", path.display()))?;
      Ok(output.with_font(font))
    }
    None => Ok(output),
  }
}

#[cfg(not(feature = "save_image_file"))]
fn with_font(output: OutputWrapper, font: Option<&Path>) -> Result<OutputWrapper> {
  if font.is_some() {
    tracing::warn!("未启用图像输出，忽略字体参数");
  }
  Ok(output)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = &args.output {
    info!("标注输出: {}", output);
  }
  if let Some(report) = &args.report {
    info!("检测报告: {}", report);
  }

  let config = args.detector_config()?;
  let labels = match &args.labels {
    Some(path) => LabelMap::from_names_file(path)
      .with_context(|| format!("无法读取类别名称文件: {}", path.display()))?,
    None => LabelMap::coco(),
  };

  let detector = ProfileDetector::from_config(&config).context("检测器初始化失败")?;
  let input = ImageFileInput::from_url(&args.input)?;

  let mut outputs: Vec<Box<dyn Render<Error = OutputError>>> = Vec::new();
  if let Some(url) = &args.output {
    let output = OutputWrapper::from_url(url)?.with_labels(labels.clone());
    let output = with_font(output, args.font.as_deref())?;
    outputs.push(Box::new(AcceptedOnly(output)));
  }
  if let Some(url) = &args.report {
    outputs.push(Box::new(OutputWrapper::from_url(url)?.with_labels(labels)));
  }

  let summary = BatchTask::default()
    .with_max_images(args.max_images)
    .with_interrupt(true)
    .run_task(input, &detector, outputs)?;

  info!("{}", summary);
  Ok(())
}
