// 该文件是 Touxiang （头像） 项目的一部分。
// src/detector/nms.rs - 非极大值抑制
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

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::{BoundingBox, Candidate, Detection};

impl BoundingBox {
  /// 计算两个边界框的 IoU，任一框面积为零时结果为 0
  pub fn iou(&self, other: &Self) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if intersection <= 0.0 {
      return 0.0;
    }

    let union = self.area() + other.area() - intersection;
    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 贪心非极大值抑制，不区分类别。
///
/// 候选按置信度降序（同分保持原有顺序）依次处理，与任一已保留框的
/// IoU 大于 `nms_threshold` 的候选被丢弃。置信度不大于
/// `confidence_threshold` 的候选在抑制前再过滤一次。
/// 返回结果按置信度降序排列，但调用方不应依赖该顺序。
pub fn suppress(
  candidates: Vec<Candidate>,
  confidence_threshold: f32,
  nms_threshold: f32,
) -> Vec<Detection> {
  if candidates.is_empty() {
    warn!("图像中没有可处理的检测结果");
    return Vec::new();
  }

  let mut candidates: Vec<Candidate> = candidates
    .into_iter()
    .filter(|c| c.confidence > confidence_threshold)
    .collect();
  candidates.sort_by(|a, b| {
    b.confidence
      .partial_cmp(&a.confidence)
      .unwrap_or(Ordering::Equal)
  });

  let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.bbox.iou(&candidate.bbox) > nms_threshold);
    if !suppressed {
      kept.push(candidate.into());
    }
  }

  debug!("抑制后保留 {} 个检测框", kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(x: f32, y: f32, w: f32, h: f32, class_id: u32, confidence: f32) -> Candidate {
    Candidate {
      bbox: BoundingBox::new(x, y, w, h),
      class_id,
      confidence,
    }
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(20.0, 20.0, 5.0, 5.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_with_zero_area_box_is_zero() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(5.0, 5.0, 0.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(b.iou(&b), 0.0);
  }

  #[test]
  fn iou_works_on_boxes_outside_the_image() {
    let a = BoundingBox::new(-10.0, -10.0, 20.0, 20.0);
    let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert!((a.iou(&b) - 0.25).abs() < 1e-6);
  }

  #[test]
  fn empty_input_returns_empty() {
    assert!(suppress(Vec::new(), 0.5, 0.4).is_empty());
  }

  #[test]
  fn keeps_only_the_stronger_of_two_same_class_boxes() {
    // IoU = 60 / 100 = 0.6: 两个 10x8 的框沿 x 方向错开 2.5 像素
    // 交集 7.5 x 8 = 60, 并集 80 + 80 - 60 = 100
    let a = candidate(0.0, 0.0, 10.0, 8.0, 0, 0.6);
    let b = candidate(2.5, 0.0, 10.0, 8.0, 0, 0.9);
    assert!((a.bbox.iou(&b.bbox) - 0.6).abs() < 1e-6);

    let detections = suppress(vec![a, b], 0.5, 0.4);
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].confidence, 0.9);
  }

  #[test]
  fn suppression_ignores_class_id() {
    // IoU = 0.5: 两个 10x9 的框错开 10/3 像素，交集 60, 并集 120
    let a = candidate(0.0, 0.0, 10.0, 9.0, 0, 0.8);
    let b = candidate(10.0 / 3.0, 0.0, 10.0, 9.0, 16, 0.7);
    assert!((a.bbox.iou(&b.bbox) - 0.5).abs() < 1e-5);

    let detections = suppress(vec![b, a], 0.5, 0.4);
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_id, 0);
    assert_eq!(detections[0].confidence, 0.8);
  }

  #[test]
  fn overlap_equal_to_threshold_is_kept() {
    let a = candidate(0.0, 0.0, 10.0, 8.0, 0, 0.9);
    let b = candidate(2.5, 0.0, 10.0, 8.0, 0, 0.6);
    let detections = suppress(vec![a, b], 0.5, 0.6);
    assert_eq!(detections.len(), 2);
  }

  #[test]
  fn reapplies_the_confidence_threshold() {
    let a = candidate(0.0, 0.0, 10.0, 10.0, 0, 0.5);
    let b = candidate(50.0, 50.0, 10.0, 10.0, 0, 0.3);
    assert!(suppress(vec![a, b], 0.5, 0.4).is_empty());
  }

  #[test]
  fn chain_suppression_only_uses_kept_boxes() {
    // b 被 a 抑制后不再参与比较，因此 c 保留
    let a = candidate(0.0, 0.0, 10.0, 10.0, 0, 0.9);
    let b = candidate(5.0, 0.0, 10.0, 10.0, 0, 0.8);
    let c = candidate(10.0, 0.0, 10.0, 10.0, 0, 0.7);
    let detections = suppress(vec![c, b, a], 0.5, 0.3);
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].confidence, 0.9);
    assert_eq!(detections[1].confidence, 0.7);
  }

  #[test]
  fn survivors_never_overlap_beyond_threshold() {
    let mut candidates = Vec::new();
    for i in 0..20 {
      let offset = i as f32 * 3.0;
      candidates.push(candidate(offset, offset / 2.0, 12.0, 12.0, i % 3, 0.51 + i as f32 * 0.02));
    }
    let threshold = 0.4;
    let detections = suppress(candidates.clone(), 0.5, threshold);
    assert!(!detections.is_empty());
    assert!(detections.len() <= candidates.len());
    for (i, a) in detections.iter().enumerate() {
      for b in detections.iter().skip(i + 1) {
        assert!(a.bbox.iou(&b.bbox) <= threshold);
      }
    }
  }
}
