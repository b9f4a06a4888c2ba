// 该文件是 Yunmu （云目） 项目的一部分。
// src/summary.rs - 批处理汇总与报告导出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::model::{BatchItem, Detection, ItemOutcome, ModelResult, NormalizedResponse};

/// 批处理汇总统计。
///
/// 始终从当前批次项列表现算，从不缓存。序列化键与导出报告一致。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
  pub total_images: usize,
  pub successful: usize,
  pub failed: usize,
  pub total_objects_detected: usize,
  /// 排序去重后的类别集合，保证报告输出稳定
  pub unique_classes: Vec<String>,
  /// 所有模型耗时样本的均值（秒）；没有样本时为 `None`，而非错误
  pub avg_inference_time: Option<f64>,
}

/// 把已完成的批次项列表归约成汇总统计。
/// 对比模式的目标数取两个模型中的较大者，类别取两个模型的并集，
/// 耗时均值覆盖整个批次观察到的每一个模型耗时样本。
pub fn summarize(items: &[BatchItem]) -> AggregateSummary {
  let mut successful = 0usize;
  let mut failed = 0usize;
  let mut total_objects = 0usize;
  let mut classes: BTreeSet<String> = BTreeSet::new();
  let mut times: Vec<f64> = Vec::new();

  for item in items {
    match &item.outcome {
      ItemOutcome::Done(response) => {
        successful += 1;
        total_objects += response.object_count();
        classes.extend(response.classes().into_iter().map(str::to_string));
        times.extend(response.time_samples());
      }
      ItemOutcome::Failed(_) => failed += 1,
    }
  }

  let avg_inference_time = if times.is_empty() {
    None
  } else {
    Some(times.iter().sum::<f64>() / times.len() as f64)
  };

  AggregateSummary {
    total_images: items.len(),
    successful,
    failed,
    total_objects_detected: total_objects,
    unique_classes: classes.into_iter().collect(),
    avg_inference_time,
  }
}

/// 单个模型检测置信度的均值。
/// 旧版占位检测没有置信度，不参与；没有任何样本时为 `None`。
pub fn mean_confidence(result: &ModelResult) -> Option<f32> {
  let scores: Vec<f32> = result.detections.iter().filter_map(|d| d.confidence).collect();
  if scores.is_empty() {
    None
  } else {
    Some(scores.iter().sum::<f32>() / scores.len() as f32)
  }
}

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 报告中的单项记录。
///
/// 对比模式项沿用既有导出约定：`detections` 为空列表、
/// `inferenceTime` 为 null，`numDetected` 取两个模型中的较大者。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
  pub filename: String,
  pub success: bool,
  pub detections: Vec<Detection>,
  pub num_detected: usize,
  pub inference_time: Option<f64>,
  pub error: Option<String>,
}

/// 导出的批处理报告。
///
/// 这是系统唯一的持久产物，只写不读，模式保持稳定：
/// `summary` 为汇总统计，`results` 为逐项记录。
#[derive(Debug, Serialize)]
pub struct BatchReport {
  pub summary: AggregateSummary,
  pub results: Vec<ReportEntry>,
}

impl BatchReport {
  pub fn new(items: &[BatchItem]) -> Self {
    let results = items
      .iter()
      .map(|item| match &item.outcome {
        ItemOutcome::Done(response) => {
          let (detections, inference_time) = match response {
            NormalizedResponse::Single(m) => (m.detections.clone(), m.inference_time),
            NormalizedResponse::Comparison(_) => (Vec::new(), None),
          };
          ReportEntry {
            filename: item.filename.clone(),
            success: true,
            num_detected: response.object_count(),
            detections,
            inference_time,
            error: None,
          }
        }
        ItemOutcome::Failed(reason) => ReportEntry {
          filename: item.filename.clone(),
          success: false,
          detections: Vec::new(),
          num_detected: 0,
          inference_time: None,
          error: Some(reason.clone()),
        },
      })
      .collect();

    BatchReport {
      summary: summarize(items),
      results,
    }
  }

  /// 默认报告文件名，按当天日期命名
  pub fn default_filename() -> String {
    format!("batch-results-{}.json", Utc::now().format("%Y-%m-%d"))
  }

  pub fn to_json(&self) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, self.to_json()?)?;
    Ok(())
  }
}
