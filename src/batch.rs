// 该文件是 Yunmu （云目） 项目的一部分。
// src/batch.rs - 批处理编排
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

use std::collections::VecDeque;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use tracing::{debug, info, warn};

use crate::model::{BatchItem, ItemOutcome, ModelKind, Progress};
use crate::normalize::normalize;
use crate::remote::InferenceBackend;
use crate::session::{PendingFile, image_mime};

/// 同时在途的请求数上限，恒为 1（严格串行，对推理服务背压）。
/// 将来放宽并发度只改这一行。
pub const MAX_IN_FLIGHT: usize = 1;

/// 批处理执行器。
///
/// 对推理边界保持泛型，网络往返在测试里用脚本化伪实现替换。
pub struct BatchRunner<B> {
  backend: B,
  model: ModelKind,
}

impl<B: InferenceBackend> BatchRunner<B> {
  pub fn new(backend: B, model: ModelKind) -> Self {
    BatchRunner { backend, model }
  }

  /// 按输入顺序逐项处理整个批次。
  ///
  /// 每完成一项（无论成败）先发出一次进度事件再继续下一项；单项的
  /// 读取、上传或推理失败只记录在该项上，绝不中断其余项。输入 N 项
  /// 必定返回 N 项；结果按序号写回槽位，输出顺序与输入一致，即使
  /// 将来并发度大于 1 该约定也成立。一旦开始，整个批次运行到底，
  /// 没有中途取消路径，也不做重试。
  pub async fn process_batch<F>(&self, files: &[PendingFile], mut on_progress: F) -> Vec<BatchItem>
  where
    F: FnMut(Progress),
  {
    let total = files.len();
    let mut slots: Vec<Option<BatchItem>> = (0..total).map(|_| None).collect();

    // 有界并发（度为 1）的任务队列
    let mut queue: VecDeque<(usize, &PendingFile)> = files.iter().enumerate().collect();
    let mut in_flight = 0usize;
    let mut done = 0usize;

    info!("开始批处理，共 {} 项，模型: {}", total, self.model);
    while let Some((index, file)) = queue.pop_front() {
      in_flight += 1;
      debug_assert!(in_flight <= MAX_IN_FLIGHT);

      let item = self.process_one(file).await;
      if let Some(reason) = item.error() {
        warn!("第 {} 项 {} 处理失败: {}", index + 1, file.filename, reason);
      }
      slots[index] = Some(item);

      in_flight -= 1;
      done += 1;
      on_progress(Progress { current: done, total });
    }

    slots
      .into_iter()
      .map(|slot| slot.expect("批处理槽位必须已填充"))
      .collect()
  }

  /// 处理单张图像：读取字节、上传推理、归一化。
  /// 单图直通路径与批处理共用该例程。
  pub async fn process_one(&self, file: &PendingFile) -> BatchItem {
    // 读取文件字节（第一个挂起点）
    let bytes = match tokio::fs::read(&file.path).await {
      Ok(bytes) => bytes,
      Err(e) => {
        return BatchItem {
          filename: file.filename.clone(),
          outcome: ItemOutcome::Failed(format!("读取文件失败: {}", e)),
          image_url: None,
        };
      }
    };
    let image_url = Some(data_url(&file.filename, &bytes));

    // 远程推理往返（第二个挂起点）
    let raw = match self.backend.infer(&bytes, &file.filename, self.model).await {
      Ok(raw) => raw,
      Err(e) => {
        return BatchItem {
          filename: file.filename.clone(),
          outcome: ItemOutcome::Failed(e.to_string()),
          image_url,
        };
      }
    };

    let normalized = normalize(&raw);
    debug!("{}: 检测到 {} 个目标", file.filename, normalized.object_count());

    BatchItem {
      filename: file.filename.clone(),
      outcome: ItemOutcome::Done(normalized),
      image_url,
    }
  }
}

/// 原始字节的 data URL，记录在读取成功的批次项上
pub fn data_url(filename: &str, bytes: &[u8]) -> String {
  let mime = image_mime(Path::new(filename)).unwrap_or("application/octet-stream");
  format!("data:{};base64,{}", mime, B64.encode(bytes))
}
