// 该文件是 Touxiang （头像） 项目的一部分。
// src/detector/decode.rs - 检测头输出解码
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

use tracing::debug;

use super::{BoundingBox, Candidate};
use crate::model::{BOX_COLUMNS, RawOutput};

/// 返回 (最大分数, 类别编号)，分数相同时取编号最小者
fn max_class_score(scores: &[f32]) -> Option<(f32, u32)> {
  let (&first, rest) = scores.split_first()?;
  let mut max_score = first;
  let mut class_id = 0usize;
  for (c, &score) in rest.iter().enumerate() {
    if score > max_score {
      max_score = score;
      class_id = c + 1;
    }
  }
  Some((max_score, class_id as u32))
}

/// 把所有检测头的原始输出解码为图像像素坐标下的候选框。
///
/// 只有最大类别分数严格大于 `confidence_threshold` 的行会被保留。
/// 归一化的中心坐标与宽高乘以原图尺寸后转换为左上角坐标，
/// 左上角向零截断为整数像素，宽高保留浮点值；不裁剪到图像边界。
pub fn decode(
  raw_outputs: &[RawOutput],
  image_width: u32,
  image_height: u32,
  confidence_threshold: f32,
) -> Vec<Candidate> {
  let image_width = image_width as f32;
  let image_height = image_height as f32;
  let mut candidates = Vec::new();

  for output in raw_outputs {
    debug!(
      "解码输出 {}: {} 行, {} 个类别",
      output.name(),
      output.num_rows(),
      output.num_classes()
    );

    for row in output.rows() {
      let Some((confidence, class_id)) = max_class_score(&row[BOX_COLUMNS..]) else {
        continue;
      };

      // 等于阈值的行同样丢弃，NaN 也在这里被过滤
      if !(confidence > confidence_threshold) {
        continue;
      }

      let center_x = row[0] * image_width;
      let center_y = row[1] * image_height;
      let width = row[2] * image_width;
      let height = row[3] * image_height;

      let x = (center_x - width / 2.0) as i32;
      let y = (center_y - height / 2.0) as i32;

      candidates.push(Candidate {
        bbox: BoundingBox::new(x as f32, y as f32, width, height),
        class_id,
        confidence,
      });
    }
  }

  candidates
}

#[cfg(test)]
mod tests {
  use super::*;

  fn output(rows: &[Vec<f32>]) -> RawOutput {
    RawOutput::from_rows("yolo_82", rows).unwrap()
  }

  #[test]
  fn no_outputs_gives_no_candidates() {
    assert!(decode(&[], 640, 480, 0.5).is_empty());
    let rows: [Vec<f32>; 0] = [];
    assert!(decode(&[output(&rows)], 640, 480, 0.5).is_empty());
  }

  #[test]
  fn scales_to_image_pixels_and_moves_to_top_left() {
    let raw = output(&[vec![0.5, 0.25, 0.5, 0.25, 0.9, 0.1, 0.8, 0.3]]);
    let candidates = decode(&[raw], 200, 400, 0.5);
    assert_eq!(candidates.len(), 1);
    let candidate = candidates[0];
    assert_eq!(candidate.class_id, 1);
    assert_eq!(candidate.confidence, 0.8);
    assert_eq!(candidate.bbox, BoundingBox::new(50.0, 50.0, 100.0, 100.0));
  }

  #[test]
  fn threshold_is_strict() {
    let raw = output(&[
      vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.5, 0.0],
      vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.0, 0.51],
    ]);
    let candidates = decode(&[raw], 100, 100, 0.5);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn objectness_column_is_not_a_class_score() {
    // 第 5 列是 objectness，高分也不能让候选通过
    let raw = output(&[vec![0.5, 0.5, 0.1, 0.1, 0.99, 0.2, 0.3]]);
    assert!(decode(&[raw], 100, 100, 0.5).is_empty());
  }

  #[test]
  fn ties_pick_the_lowest_class_id() {
    let raw = output(&[vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.2, 0.7, 0.7, 0.7]]);
    let candidates = decode(&[raw], 100, 100, 0.5);
    assert_eq!(candidates[0].class_id, 1);
  }

  #[test]
  fn nan_scores_are_discarded() {
    let raw = output(&[vec![0.5, 0.5, 0.1, 0.1, 1.0, f32::NAN, f32::NAN]]);
    assert!(decode(&[raw], 100, 100, 0.5).is_empty());
  }

  #[test]
  fn top_left_is_truncated_not_rounded() {
    // cx = 10.9, w = 1.0 -> x = 10.4 -> 10; cy = 10.9, h = 0.2 -> y = 10.8 -> 10
    let raw = output(&[vec![0.109, 0.109, 0.01, 0.002, 1.0, 0.9, 0.0]]);
    let candidate = decode(&[raw], 100, 100, 0.5)[0];
    assert_eq!(candidate.bbox.x, 10.0);
    assert_eq!(candidate.bbox.y, 10.0);
    assert!((candidate.bbox.width - 1.0).abs() < 1e-5);
    assert!((candidate.bbox.height - 0.2).abs() < 1e-5);
  }

  #[test]
  fn boxes_past_the_edge_are_not_clipped() {
    // 中心贴近左上角的大框，左上角落在图像外
    let raw = output(&[vec![0.1, 0.05, 0.6, 0.5, 1.0, 0.9, 0.0]]);
    let candidate = decode(&[raw], 100, 100, 0.5)[0];
    assert_eq!(candidate.bbox.x, -20.0);
    assert_eq!(candidate.bbox.y, -20.0);
    assert!((candidate.bbox.width - 60.0).abs() < 1e-4);
    assert!((candidate.bbox.height - 50.0).abs() < 1e-4);
  }

  #[test]
  fn negative_coordinates_truncate_toward_zero() {
    // cx = 1, w = 5 -> x = -1.5 -> -1
    let raw = output(&[vec![0.01, 0.5, 0.05, 0.1, 1.0, 0.9, 0.0]]);
    let candidate = decode(&[raw], 100, 100, 0.5)[0];
    assert_eq!(candidate.bbox.x, -1.0);
  }

  #[test]
  fn reads_rows_from_every_head() {
    let a = output(&[vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.9, 0.0]]);
    let b = output(&[
      vec![0.2, 0.2, 0.1, 0.1, 1.0, 0.0, 0.7],
      vec![0.2, 0.2, 0.1, 0.1, 1.0, 0.0, 0.1],
    ]);
    let candidates = decode(&[a, b], 100, 100, 0.5);
    assert_eq!(candidates.len(), 2);
    assert!(candidates.len() <= 3);
  }
}
