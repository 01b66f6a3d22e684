// 该文件是 Touxiang （头像） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理耗时测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use touxiang::{
  DetectorConfig, FromUrl, ProfileDetector,
  input::ImageFileInput,
  output::{OutputError, OutputWrapper, Render},
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 对同一幅图像重复检测，统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 最后一次结果的输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 重复次数
  #[arg(long, default_value_t = 1000, value_name = "COUNT")]
  pub repeat: usize,
  /// 不计入平均值的预热次数
  #[arg(long, default_value_t = 2, value_name = "COUNT")]
  pub warmup: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);

  let config = DetectorConfig::from_url(&args.model)?;
  let detector = ProfileDetector::from_config(&config)?;
  let input = ImageFileInput::from_url(&args.input)?;
  let output: Vec<Box<dyn Render<Error = OutputError>>> = match &args.output {
    Some(url) => vec![Box::new(OutputWrapper::from_url(url)?)],
    None => Vec::new(),
  };

  let summary = RepeatShotTask::new(args.repeat, args.warmup).run_task(input, &detector, output)?;
  info!("{} 次有效推理, 平均耗时 {:.2?}", summary.runs, summary.mean);

  Ok(())
}
