// 该文件是 Touxiang （头像） 项目的一部分。
// src/task.rs - 任务驱动
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
  fmt,
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::{
  detector::{Analysis, DetectorError, ProfileDetector},
  input::ImageItem,
  model::InferenceAdapter,
  output::Render,
};

pub trait Task<I, A, O>: Sized {
  type Output;
  type Error;
  fn run_task(
    self,
    input: I,
    detector: &ProfileDetector<A>,
    output: O,
  ) -> Result<Self::Output, Self::Error>;
}

fn first_image<I, IE>(input: &mut I) -> anyhow::Result<ImageItem>
where
  I: Iterator<Item = Result<ImageItem, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
{
  let item = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
  Ok(item?)
}

/// 处理第一幅图像并输出结果
pub struct OneShotTask;

impl<I, IE, A, O, RE> Task<I, A, O> for OneShotTask
where
  I: Iterator<Item = Result<ImageItem, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  A: InferenceAdapter,
  O: Render<Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = Analysis;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: &ProfileDetector<A>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let item = first_image(&mut input)?;
    info!("输入图像 {} 读取成功，开始检测...", item.path.display());
    let now = Instant::now();
    let analysis = detector.analyze(&item.image)?;
    info!("检测完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&item, &analysis)?;
    Ok(analysis)
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub processed: usize,
  pub accepted: usize,
  pub rejected: usize,
  pub failed: usize,
}

impl fmt::Display for TaskSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "共处理 {} 幅图像: 合格 {}, 不合格 {}, 失败 {}",
      self.processed, self.accepted, self.rejected, self.failed
    )
  }
}

/// 逐幅判定输入图像，单幅图像读取或解码失败时记录并继续
#[derive(Default, Debug)]
pub struct BatchTask {
  max_images: Option<usize>,
  interruptible: bool,
  interrupt: Option<Receiver<()>>,
}

impl BatchTask {
  pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
    self.max_images = max_images;
    self
  }

  /// 注册 Ctrl-C 处理，收到信号后处理完当前图像即退出。每个进程只能注册一次
  pub fn with_interrupt(mut self, interruptible: bool) -> Self {
    self.interruptible = interruptible;
    self
  }

  /// 使用外部提供的中断信号，代替 Ctrl-C 处理
  pub fn with_interrupt_receiver(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }
}

fn install_interrupt_handler() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法注册 Ctrl-C 处理函数")?;
  Ok(rx)
}

impl<I, IE, A, O, RE> Task<I, A, O> for BatchTask
where
  I: Iterator<Item = Result<ImageItem, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  A: InferenceAdapter,
  O: Render<Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    detector: &ProfileDetector<A>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let interrupt = match self.interrupt {
      Some(interrupt) => Some(interrupt),
      None if self.interruptible => Some(install_interrupt_handler()?),
      None => None,
    };

    let mut summary = TaskSummary::default();
    for item in input {
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if self.max_images.is_some_and(|n| summary.processed >= n) {
        info!("达到指定图像数 {}, 退出任务循环", summary.processed);
        break;
      }
      summary.processed += 1;

      let item = match item {
        Ok(item) => item,
        Err(err) => {
          error!("读取图像失败: {}", err);
          summary.failed += 1;
          continue;
        }
      };

      info!("处理第 {} 幅图像: {}", summary.processed, item.path.display());
      let now = Instant::now();
      let analysis = match detector.analyze(&item.image) {
        Ok(analysis) => analysis,
        Err(DetectorError::InvalidImage(reason)) => {
          error!("无效图像 {}: {}", item.path.display(), reason);
          summary.failed += 1;
          continue;
        }
        Err(err) => {
          return Err(err).with_context(|| format!("检测失败: {}", item.path.display()));
        }
      };

      if analysis.validation.is_valid() {
        summary.accepted += 1;
        info!("{} 是合格的头像", item.path.display());
      } else {
        summary.rejected += 1;
        warn!(
          "{} 不是合格的头像: {}",
          item.path.display(),
          analysis.validation.verdict
        );
      }

      output
        .render_result(&item, &analysis)
        .with_context(|| format!("输出结果失败: {}", item.path.display()))?;
      info!("完成，耗时: {:.2?}", now.elapsed());
    }

    info!("任务完成，{}", summary);
    Ok(summary)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkSummary {
  pub runs: usize,
  pub mean: Duration,
}

/// 对第一幅图像重复检测，统计平均耗时
#[derive(Debug, Clone, Copy)]
pub struct RepeatShotTask {
  repeat: usize,
  warmup: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self {
      repeat: 1000,
      warmup: 2,
    }
  }
}

impl RepeatShotTask {
  pub fn new(repeat: usize, warmup: usize) -> Self {
    Self { repeat, warmup }
  }
}

impl<I, IE, A, O, RE> Task<I, A, O> for RepeatShotTask
where
  I: Iterator<Item = Result<ImageItem, IE>>,
  IE: std::error::Error + Send + Sync + 'static,
  A: InferenceAdapter,
  O: Render<Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = BenchmarkSummary;
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    detector: &ProfileDetector<A>,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    if self.repeat <= self.warmup {
      anyhow::bail!(
        "重复次数 {} 必须大于预热次数 {}",
        self.repeat,
        self.warmup
      );
    }

    info!("开始任务...");
    let item = first_image(&mut input)?;
    info!("输入图像读取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let analysis = detector.analyze(&item.image)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(analysis);
    }

    if let Some(analysis) = last {
      output.render_result(&item, &analysis)?;
    }

    let runs = times.len() - self.warmup;
    let mean = times.iter().skip(self.warmup).sum::<Duration>() / runs as u32;
    warn!("平均推理时间: {:.2?}", mean);
    Ok(BenchmarkSummary { runs, mean })
  }
}
