// 该文件是 Touxiang （头像） 项目的一部分。
// src/detector/validate.rs - 头像合格判定
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

use std::fmt;

use tracing::{info, warn};

use super::Detection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
  Accepted,
  /// 检测数量不是 1
  WrongFaceCount(usize),
  /// 占比不在区间内
  FaceAreaOutOfRange,
  /// 类别不是人
  NotHuman,
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::Accepted => f.write_str("accepted"),
      Verdict::WrongFaceCount(_) => f.write_str("wrong_face_count"),
      Verdict::FaceAreaOutOfRange => f.write_str("face_area_out_of_range"),
      Verdict::NotHuman => f.write_str("not_human"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
  pub verdict: Verdict,
  /// 只有恰好一个检测时才有值
  pub face_percentage: Option<f64>,
  pub class_id: Option<u32>,
}

impl ValidationResult {
  pub fn is_valid(&self) -> bool {
    self.verdict == Verdict::Accepted
  }
}

/// 头像判定规则：恰好一个检测，类别为人，面积占比落在闭区间内
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileRule {
  pub min_face_percentage: f64,
  pub max_face_percentage: f64,
  pub human_class_id: u32,
}

impl ProfileRule {
  pub fn validate(
    &self,
    detections: &[Detection],
    image_width: u32,
    image_height: u32,
  ) -> ValidationResult {
    let [detection] = detections else {
      warn!(
        "检测到的人脸数量无效: 期望 1 个, 实际 {} 个",
        detections.len()
      );
      return ValidationResult {
        verdict: Verdict::WrongFaceCount(detections.len()),
        face_percentage: None,
        class_id: None,
      };
    };

    let face_area = detection.bbox.width as f64 * detection.bbox.height as f64;
    let image_area = image_width as f64 * image_height as f64;
    // 先乘 100 再除，整数百分比的边界值可以精确表示
    let face_percentage = face_area * 100.0 / image_area;
    let class_id = detection.class_id;

    let in_range =
      face_percentage >= self.min_face_percentage && face_percentage <= self.max_face_percentage;
    let verdict = if !in_range {
      Verdict::FaceAreaOutOfRange
    } else if class_id != self.human_class_id {
      Verdict::NotHuman
    } else {
      Verdict::Accepted
    };

    if verdict == Verdict::Accepted {
      info!(
        "人像占图像的 {:.2}%, 在允许范围 ({}% - {}%) 内",
        face_percentage, self.min_face_percentage, self.max_face_percentage
      );
    } else {
      warn!(
        "人像需占图像的 {}% 到 {}% 且类别为人: 实际占 {:.2}%, 类别 {}",
        self.min_face_percentage, self.max_face_percentage, face_percentage, class_id
      );
    }

    ValidationResult {
      verdict,
      face_percentage: Some(face_percentage),
      class_id: Some(class_id),
    }
  }
}

/// 判断检测结果是否构成合格头像
pub fn is_valid_profile_picture(
  detections: &[Detection],
  image_width: u32,
  image_height: u32,
  min_face_percentage: f64,
  max_face_percentage: f64,
  human_class_id: u32,
) -> bool {
  ProfileRule {
    min_face_percentage,
    max_face_percentage,
    human_class_id,
  }
  .validate(detections, image_width, image_height)
  .is_valid()
}
