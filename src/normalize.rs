// 该文件是 Yunmu （云目） 项目的一部分。
// src/normalize.rs - 服务端响应归一化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{ComparisonResult, Detection, ModelResult, NormalizedResponse};

/// 单模型形状中的一条原始检测
#[derive(Debug, Deserialize)]
struct RawDetection {
  class: String,
  confidence: f32,
  #[serde(rename = "box")]
  bbox: [f32; 4],
}

/// 单模型响应形状
#[derive(Debug, Deserialize)]
struct RawModelResult {
  detections: Vec<RawDetection>,
  width: Option<u32>,
  height: Option<u32>,
  inference_time: Option<f64>,
  model: Option<String>,
}

/// 对比模式的判别标记，只接受字面量 "comparison"
#[derive(Debug, Deserialize)]
enum ComparisonTag {
  #[serde(rename = "comparison")]
  Comparison,
}

/// 对比模式响应形状
#[derive(Debug, Deserialize)]
struct RawComparison {
  #[allow(dead_code)]
  mode: ComparisonTag,
  results: RawComparisonPair,
}

/// 两个子结果各自递归归一化，因此这里保留原始 JSON
#[derive(Debug, Deserialize)]
struct RawComparisonPair {
  medium: Value,
  large: Value,
}

/// 旧版形状：只有类别名称的扁平列表
#[derive(Debug, Deserialize)]
struct RawLegacy {
  detected_objects: Vec<String>,
}

/// 单模型层面的两种已知形状
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawModelShape {
  Detections(RawModelResult),
  Legacy(RawLegacy),
}

/// 把一条原始响应归一化为标签联合。
///
/// 判别只发生一次：带 `mode: "comparison"` 标记的响应是对比结果，
/// 两个子结果分别递归归一化；其余交给单模型归一化。对三种已文档化
/// 的形状该函数都不会失败，无法识别的形状产生带诊断标记的空结果。
pub fn normalize(raw: &Value) -> NormalizedResponse {
  if let Ok(comparison) = serde_json::from_value::<RawComparison>(raw.clone()) {
    debug!("响应携带对比标记，按双模型结果归一化");
    return NormalizedResponse::Comparison(ComparisonResult {
      medium: normalize_model(&comparison.results.medium),
      large: normalize_model(&comparison.results.large),
    });
  }

  NormalizedResponse::Single(normalize_model(raw))
}

/// 归一化单模型层面的响应
fn normalize_model(raw: &Value) -> ModelResult {
  match serde_json::from_value::<RawModelShape>(raw.clone()) {
    Ok(RawModelShape::Detections(result)) => match validate(result) {
      Ok(result) => result,
      Err(reason) => {
        warn!("检测结果未通过校验，降级为回退结果: {}", reason);
        ModelResult::fallback(reason)
      }
    },
    Ok(RawModelShape::Legacy(legacy)) => {
      debug!("旧版响应形状，生成 {} 个零几何占位检测", legacy.detected_objects.len());
      ModelResult {
        detections: legacy
          .detected_objects
          .into_iter()
          .map(Detection::placeholder)
          .collect(),
        ..ModelResult::default()
      }
    }
    Err(_) => {
      warn!("无法识别的响应形状，降级为回退结果");
      ModelResult::fallback("无法识别的响应形状")
    }
  }
}

/// 校验原始检测的数值约束。
/// 置信度必须落在 [0, 1]，边界框必须满足 x2 >= x1 >= 0 且 y2 >= y1 >= 0；
/// 任何越界值都不会被透传，整条结果降级为回退。
fn validate(raw: RawModelResult) -> Result<ModelResult, String> {
  let mut detections = Vec::with_capacity(raw.detections.len());

  for (index, det) in raw.detections.into_iter().enumerate() {
    if !det.confidence.is_finite() || !(0.0..=1.0).contains(&det.confidence) {
      return Err(format!("第 {} 条检测置信度越界: {}", index, det.confidence));
    }
    let [x1, y1, x2, y2] = det.bbox;
    if !det.bbox.iter().all(|v| v.is_finite() && *v >= 0.0) || x2 < x1 || y2 < y1 {
      return Err(format!(
        "第 {} 条检测边界框非法: [{}, {}, {}, {}]",
        index, x1, y1, x2, y2
      ));
    }
    detections.push(Detection {
      class: det.class,
      confidence: Some(det.confidence),
      bbox: Some(det.bbox),
    });
  }

  Ok(ModelResult {
    detections,
    width: raw.width,
    height: raw.height,
    inference_time: raw.inference_time,
    model: raw.model,
    fallback: None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn single_body() -> Value {
    json!({
      "detections": [
        {"class": "cat", "confidence": 0.92, "box": [10.0, 20.0, 110.0, 220.0]},
        {"class": "dog", "confidence": 0.58, "box": [0.0, 0.0, 50.0, 40.0]}
      ],
      "width": 640,
      "height": 480,
      "inference_time": 0.125,
      "model": "yolov8m"
    })
  }

  #[test]
  fn single_shape_normalizes_with_geometry() {
    let NormalizedResponse::Single(result) = normalize(&single_body()) else {
      panic!("期望单模型结果");
    };
    assert_eq!(result.detections.len(), 2);
    assert_eq!(result.detections[0].class, "cat");
    assert_eq!(result.detections[0].confidence, Some(0.92));
    assert_eq!(result.detections[0].bbox, Some([10.0, 20.0, 110.0, 220.0]));
    assert_eq!(result.natural_size(), Some((640, 480)));
    assert_eq!(result.inference_time, Some(0.125));
    assert!(result.fallback.is_none());
  }

  #[test]
  fn comparison_shape_dispatches_on_mode_marker() {
    let raw = json!({
      "mode": "comparison",
      "results": {
        "medium": single_body(),
        "large": {"detected_objects": ["bird"]}
      }
    });
    let NormalizedResponse::Comparison(result) = normalize(&raw) else {
      panic!("期望对比结果");
    };
    assert_eq!(result.medium.detections.len(), 2);
    // 子结果递归归一化：大模型一侧是旧版形状
    assert_eq!(result.large.detections.len(), 1);
    assert!(result.large.detections[0].bbox.is_none());
  }

  #[test]
  fn mode_marker_must_be_comparison() {
    // mode 字段存在但不是 "comparison"，不得当作对比结果
    let raw = json!({
      "mode": "something-else",
      "results": {"medium": {}, "large": {}}
    });
    let NormalizedResponse::Single(result) = normalize(&raw) else {
      panic!("期望单模型回退结果");
    };
    assert!(result.fallback.is_some());
  }

  #[test]
  fn legacy_shape_yields_placeholders_without_fabricated_values() {
    let raw = json!({"detected_objects": ["cat", "dog"]});
    let NormalizedResponse::Single(result) = normalize(&raw) else {
      panic!("期望单模型结果");
    };
    assert_eq!(result.detections.len(), 2);
    for det in &result.detections {
      assert!(det.confidence.is_none());
      assert!(det.bbox.is_none());
    }
    assert!(result.fallback.is_none());
  }

  #[test]
  fn unrecognized_shape_falls_back_instead_of_failing() {
    let raw = json!({"totally": "unexpected"});
    let NormalizedResponse::Single(result) = normalize(&raw) else {
      panic!("期望单模型回退结果");
    };
    assert!(result.detections.is_empty());
    assert!(result.fallback.is_some());
  }

  #[test]
  fn out_of_range_confidence_is_rejected() {
    let raw = json!({
      "detections": [{"class": "cat", "confidence": 1.7, "box": [0.0, 0.0, 1.0, 1.0]}]
    });
    let NormalizedResponse::Single(result) = normalize(&raw) else {
      panic!("期望单模型回退结果");
    };
    assert!(result.detections.is_empty());
    assert!(result.fallback.is_some());
  }

  #[test]
  fn inverted_box_is_rejected() {
    let raw = json!({
      "detections": [{"class": "cat", "confidence": 0.9, "box": [100.0, 0.0, 10.0, 50.0]}]
    });
    let NormalizedResponse::Single(result) = normalize(&raw) else {
      panic!("期望单模型回退结果");
    };
    assert!(result.fallback.is_some());
  }
}
