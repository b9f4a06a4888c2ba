// 该文件是 Yunmu （云目） 项目的一部分。
// src/model.rs - 检测结果数据模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::BTreeSet;

use serde::Serialize;

/// 一个被识别出的目标实例。
///
/// 旧版响应只携带类别名称，既没有置信度也没有边界框，此时两个可选
/// 字段均为 `None`；消费方必须按缺失分支处理，不得臆造数值。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  /// 类别名称
  pub class: String,
  /// 置信度 (0.0 - 1.0)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<f32>,
  /// 边界框 [x1, y1, x2, y2]，原始图像（自然尺寸）像素坐标
  #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
  pub bbox: Option<[f32; 4]>,
}

impl Detection {
  /// 旧版响应的零几何占位检测
  pub fn placeholder(class: impl Into<String>) -> Self {
    Detection {
      class: class.into(),
      confidence: None,
      bbox: None,
    }
  }
}

/// 单个模型对一张图像的推理输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResult {
  /// 检测列表，保持服务端返回顺序
  pub detections: Vec<Detection>,
  /// 服务端测量的图像自然宽度（像素）
  pub width: Option<u32>,
  /// 服务端测量的图像自然高度（像素）
  pub height: Option<u32>,
  /// 推理耗时（秒）
  pub inference_time: Option<f64>,
  /// 模型标识
  pub model: Option<String>,
  /// 响应形状无法识别时的诊断信息；正常结果为 `None`
  pub fallback: Option<String>,
}

impl ModelResult {
  /// 归一化回退结果：空检测列表加诊断标记，不让整条流水线失败
  pub fn fallback(reason: impl Into<String>) -> Self {
    ModelResult {
      fallback: Some(reason.into()),
      ..ModelResult::default()
    }
  }

  /// 自然尺寸（宽、高同时存在时有效）
  pub fn natural_size(&self) -> Option<(u32, u32)> {
    self.width.zip(self.height)
  }
}

/// 双模型对比输出，按模型规格区分
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
  pub medium: ModelResult,
  pub large: ModelResult,
}

/// 归一化后的推理响应。
///
/// 三种异构的服务端形状在归一化层被一次性判别成该标签联合，
/// 下游全部通过模式匹配消费，不再各自探测可选字段。
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
  Single(ModelResult),
  Comparison(ComparisonResult),
}

impl NormalizedResponse {
  /// 本条结果计入汇总的目标数量。
  /// 对比模式下两个模型可能不一致，取检测较多的一方，不求和也不重复计数。
  pub fn object_count(&self) -> usize {
    match self {
      NormalizedResponse::Single(m) => m.detections.len(),
      NormalizedResponse::Comparison(c) => c.medium.detections.len().max(c.large.detections.len()),
    }
  }

  /// 出现过的类别集合（对比模式为两个模型的并集）
  pub fn classes(&self) -> BTreeSet<&str> {
    let mut set = BTreeSet::new();
    match self {
      NormalizedResponse::Single(m) => {
        set.extend(m.detections.iter().map(|d| d.class.as_str()));
      }
      NormalizedResponse::Comparison(c) => {
        set.extend(c.medium.detections.iter().map(|d| d.class.as_str()));
        set.extend(c.large.detections.iter().map(|d| d.class.as_str()));
      }
    }
    set
  }

  /// 推理耗时样本。对比模式最多贡献两个样本。
  pub fn time_samples(&self) -> Vec<f64> {
    match self {
      NormalizedResponse::Single(m) => m.inference_time.into_iter().collect(),
      NormalizedResponse::Comparison(c) => c
        .medium
        .inference_time
        .into_iter()
        .chain(c.large.inference_time)
        .collect(),
    }
  }
}

/// 模型选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
  /// 中型模型，速度优先
  Medium,
  /// 大型模型，精度优先
  Large,
  /// 双模型对比
  Both,
}

impl ModelKind {
  /// multipart 表单 `model` 字段的取值
  pub fn form_value(&self) -> &'static str {
    match self {
      ModelKind::Medium => "medium",
      ModelKind::Large => "large",
      ModelKind::Both => "both",
    }
  }
}

impl std::fmt::Display for ModelKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.form_value())
  }
}

/// 批处理中的一个文件项。
///
/// 在网络往返完成时被填充一次，此后只读；完整的有序列表是交给
/// 汇总器和渲染器的最终产物，按值传递，任何组件不得再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
  /// 输入文件名
  pub filename: String,
  /// 成功时为归一化结果，失败时为原因字符串
  pub outcome: ItemOutcome,
  /// 原始字节的 data URL，仅在文件读取成功时存在
  pub image_url: Option<String>,
}

/// 单项结局：归一化结果与失败原因二选一
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
  Done(NormalizedResponse),
  Failed(String),
}

impl BatchItem {
  pub fn success(&self) -> bool {
    matches!(self.outcome, ItemOutcome::Done(_))
  }

  /// 失败原因（成功项为 `None`）
  pub fn error(&self) -> Option<&str> {
    match &self.outcome {
      ItemOutcome::Failed(reason) => Some(reason.as_str()),
      ItemOutcome::Done(_) => None,
    }
  }
}

/// 批处理进度事件：每完成一项（无论成败）推进一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
  pub current: usize,
  pub total: usize,
}
