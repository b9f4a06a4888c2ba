// 该文件是 Yunmu （云目） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use yunmu::batch::BatchRunner;
use yunmu::model::{ItemOutcome, NormalizedResponse};
use yunmu::output::{OverlayPainter, RenderSize, create_overlay_writer, load_rgb_image};
use yunmu::remote::HttpInferenceBuilder;
use yunmu::session::UploadSession;
use yunmu::summary::{BatchReport, mean_confidence, summarize};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  println!("Yunmu 远程推理客户端");
  println!("==================");
  println!("服务地址: {}", args.server);
  println!("模型选择: {}", args.model);
  println!("输入文件数: {}", args.inputs.len());
  println!();

  let rendered = match (args.render_width, args.render_height) {
    (Some(width), Some(height)) => Some(RenderSize { width, height }),
    (None, None) => None,
    _ => anyhow::bail!("渲染宽度与高度必须成对指定"),
  };

  // 会话状态机收集文件选择
  let mut session = UploadSession::new(args.model);
  session.select_files(&args.inputs)?;
  info!(
    "{}模式，{} 个图像文件",
    if session.is_batch() { "批量" } else { "单图" },
    session.files().len()
  );

  // 创建推理客户端
  let backend = HttpInferenceBuilder::new(args.server.clone())
    .timeout(Duration::from_secs(args.timeout))
    .build()?;

  // 连通性探测，失败只告警
  if let Err(e) = backend.check_health().await {
    warn!("服务健康检查失败: {}", e);
  }

  let files = session.begin_submit()?.to_vec();
  let is_batch = session.is_batch();
  let runner = BatchRunner::new(backend, session.model());

  println!("开始处理...");
  let items = if is_batch {
    runner
      .process_batch(&files, |progress| {
        session.record_progress(progress);
        info!("批处理进度: {}/{}", progress.current, progress.total);
      })
      .await
  } else {
    vec![runner.process_one(&files[0]).await]
  };
  session.finish(true)?;

  // 渲染覆盖层
  if let Some(output) = &args.output {
    let mut writer = create_overlay_writer(output)?;
    let painter = OverlayPainter::new(args.font.as_deref());

    for (item, file) in items.iter().zip(&files) {
      let ItemOutcome::Done(response) = &item.outcome else {
        continue;
      };
      // 等图像加载解码完成后再绘制
      let image = match load_rgb_image(&file.path).await {
        Ok(image) => image,
        Err(e) => {
          warn!("加载 {} 失败，跳过覆盖层: {}", file.filename, e);
          continue;
        }
      };
      let stem = file
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| item.filename.clone());

      match response {
        NormalizedResponse::Single(result) => {
          let annotated = painter.render(&image, result, rendered);
          writer.write_image(&format!("{}-annotated", stem), &annotated)?;
        }
        NormalizedResponse::Comparison(comparison) => {
          let medium = painter.render(&image, &comparison.medium, rendered);
          writer.write_image(&format!("{}-medium", stem), &medium)?;
          let large = painter.render(&image, &comparison.large, rendered);
          writer.write_image(&format!("{}-large", stem), &large)?;
        }
      }
    }
  }

  // 汇总
  let summary = summarize(&items);
  println!();
  println!("处理完成!");
  println!("总图像数: {}", summary.total_images);
  println!("成功: {}", summary.successful);
  println!("失败: {}", summary.failed);
  println!("检测目标总数: {}", summary.total_objects_detected);
  println!("唯一类别数: {}", summary.unique_classes.len());
  match summary.avg_inference_time {
    Some(avg) => println!("平均推理时间: {:.0}ms", avg * 1000.0),
    None => println!("平均推理时间: N/A"),
  }

  // 逐项明细
  for item in &items {
    match &item.outcome {
      ItemOutcome::Done(NormalizedResponse::Single(result)) => {
        println!("  - {}: {} 个目标", item.filename, result.detections.len());
        if let Some(reason) = &result.fallback {
          warn!("{}: {}", item.filename, reason);
        }
      }
      ItemOutcome::Done(NormalizedResponse::Comparison(comparison)) => {
        let medium_pct = mean_confidence(&comparison.medium).map(|c| (c * 100.0).round());
        let large_pct = mean_confidence(&comparison.large).map(|c| (c * 100.0).round());
        println!(
          "  - {}: 中型 {} 个目标 (平均置信度 {}), 大型 {} 个目标 (平均置信度 {})",
          item.filename,
          comparison.medium.detections.len(),
          medium_pct.map_or("N/A".to_string(), |p| format!("{}%", p)),
          comparison.large.detections.len(),
          large_pct.map_or("N/A".to_string(), |p| format!("{}%", p)),
        );
      }
      ItemOutcome::Failed(reason) => {
        println!("  - {}: 失败 ({})", item.filename, reason);
      }
    }
  }

  // 导出报告
  let report = BatchReport::new(&items);
  let report_path = args
    .report
    .unwrap_or_else(|| PathBuf::from(BatchReport::default_filename()));
  report.write_to(&report_path)?;
  println!();
  println!("报告已写入: {}", report_path.display());

  Ok(())
}
