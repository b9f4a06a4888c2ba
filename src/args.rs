// 该文件是 Yunmu （云目） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use yunmu::model::ModelKind;

/// Yunmu 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理服务基地址，例如 http://localhost:5000
  #[arg(long, env = "YUNMU_SERVER", value_name = "URL")]
  pub server: Url,

  /// 要处理的图像文件（一个或多个，最多 100 个）
  /// 支持格式: *.jpg, *.jpeg, *.png, *.bmp, *.gif, *.webp
  #[arg(value_name = "IMAGE", required = true)]
  pub inputs: Vec<PathBuf>,

  /// 模型选择
  /// - medium / fast: 中型模型，速度优先
  /// - large / accurate: 大型模型，精度优先
  /// - both: 双模型对比
  #[arg(long, default_value = "medium", value_parser = parse_model_kind, value_name = "MODEL")]
  pub model: ModelKind,

  /// 覆盖层输出位置
  /// 支持格式:
  /// - image:///path/to/out.png 单文件
  /// - folder:///path/to/dir 或裸目录路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<String>,

  /// 批处理报告输出路径（默认 batch-results-<日期>.json）
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,

  /// 渲染（屏显）宽度，覆盖层按该尺寸缩放；缺省与原图一致
  #[arg(long, value_name = "PIXELS")]
  pub render_width: Option<u32>,

  /// 渲染（屏显）高度
  #[arg(long, value_name = "PIXELS")]
  pub render_height: Option<u32>,

  /// 单次请求超时（秒）
  #[arg(long, default_value = "30", value_name = "SECONDS")]
  pub timeout: u64,

  /// 标签字体文件路径（缺省时尝试常见系统字体）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

fn parse_model_kind(value: &str) -> Result<ModelKind, String> {
  match value {
    "medium" | "fast" => Ok(ModelKind::Medium),
    "large" | "accurate" => Ok(ModelKind::Large),
    "both" | "compare" => Ok(ModelKind::Both),
    other => Err(format!("未知的模型选择: {}", other)),
  }
}
