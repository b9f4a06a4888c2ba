// 该文件是 Yunmu （云目） 项目的一部分。
// src/session.rs - 上传会话状态机
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::model::{ModelKind, Progress};

/// 单个批次允许的文件数上限。超出直接拒绝，不做静默截断。
pub const MAX_BATCH_FILES: usize = 100;

/// 支持的图像扩展名
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 按扩展名判断图像 MIME 类型
pub fn image_mime(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_lowercase();
  match ext.as_str() {
    "jpg" | "jpeg" => Some("image/jpeg"),
    "png" => Some("image/png"),
    "bmp" => Some("image/bmp"),
    "gif" => Some("image/gif"),
    "webp" => Some("image/webp"),
    _ => None,
  }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  /// 没有任何选择
  Idle,
  /// 选择了一个文件，尚未提交
  SinglePreview,
  /// 选择了两个以上文件，尚未提交
  BatchSelection,
  /// 请求在途
  Submitting,
  /// 结果可用
  Completed,
  /// 顶层失败
  Failed,
}

/// 待处理文件
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
  pub path: PathBuf,
  pub filename: String,
}

impl PendingFile {
  pub fn new(path: PathBuf) -> Self {
    let filename = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    PendingFile { path, filename }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
  #[error("没有选择任何图像文件")]
  NoImageFiles,
  #[error("批量文件数量超过上限 {MAX_BATCH_FILES}: {0}")]
  TooManyFiles(usize),
  #[error("提交已经在进行中")]
  AlreadySubmitting,
  #[error("文件索引越界: {0}")]
  IndexOutOfRange(usize),
  #[error("当前状态 {0:?} 不允许该操作")]
  InvalidTransition(SessionState),
}

/// 上传会话。
///
/// 纯值对象加纯转移函数：状态只能沿
/// `Idle -> SinglePreview | BatchSelection -> Submitting -> Completed | Failed`
/// 推进，显式 `reset` 回到 `Idle`。不依赖任何渲染表面，可独立测试。
/// 待处理文件列表与进度计数器只在 `Submitting` 期间由编排器写入。
#[derive(Debug, Clone)]
pub struct UploadSession {
  state: SessionState,
  model: ModelKind,
  files: Vec<PendingFile>,
  progress: Progress,
}

impl UploadSession {
  pub fn new(model: ModelKind) -> Self {
    UploadSession {
      state: SessionState::Idle,
      model,
      files: Vec::new(),
      progress: Progress { current: 0, total: 0 },
    }
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn model(&self) -> ModelKind {
    self.model
  }

  pub fn files(&self) -> &[PendingFile] {
    &self.files
  }

  pub fn progress(&self) -> Progress {
    self.progress
  }

  /// 批量模式（两个以上文件）
  pub fn is_batch(&self) -> bool {
    self.files.len() > 1
  }

  /// 选择文件，替换现有选择。
  /// 非图像文件被过滤掉；过滤后为空则状态保持不变并报错。
  pub fn select_files(&mut self, paths: &[PathBuf]) -> Result<(), SessionError> {
    match self.state {
      SessionState::Submitting => return Err(SessionError::AlreadySubmitting),
      SessionState::Completed | SessionState::Failed => {
        return Err(SessionError::InvalidTransition(self.state));
      }
      _ => {}
    }

    let filtered = filter_images(paths);
    if filtered.is_empty() {
      return Err(SessionError::NoImageFiles);
    }
    if filtered.len() > MAX_BATCH_FILES {
      return Err(SessionError::TooManyFiles(filtered.len()));
    }

    debug!("选择 {} 个图像文件（输入 {} 个）", filtered.len(), paths.len());
    self.state = if filtered.len() == 1 {
      SessionState::SinglePreview
    } else {
      SessionState::BatchSelection
    };
    self.files = filtered;
    Ok(())
  }

  /// 向批量选择追加文件，合并进现有待处理集合
  pub fn add_files(&mut self, paths: &[PathBuf]) -> Result<(), SessionError> {
    if self.state != SessionState::BatchSelection {
      return Err(SessionError::InvalidTransition(self.state));
    }

    let filtered = filter_images(paths);
    if filtered.is_empty() {
      return Err(SessionError::NoImageFiles);
    }
    let merged = self.files.len() + filtered.len();
    if merged > MAX_BATCH_FILES {
      return Err(SessionError::TooManyFiles(merged));
    }

    self.files.extend(filtered);
    Ok(())
  }

  /// 从选择中移除一个文件；集合缩到一个回到单图预览，清空回到空闲
  pub fn remove_file(&mut self, index: usize) -> Result<(), SessionError> {
    match self.state {
      SessionState::SinglePreview | SessionState::BatchSelection => {}
      _ => return Err(SessionError::InvalidTransition(self.state)),
    }
    if index >= self.files.len() {
      return Err(SessionError::IndexOutOfRange(index));
    }

    self.files.remove(index);
    self.state = match self.files.len() {
      0 => SessionState::Idle,
      1 => SessionState::SinglePreview,
      _ => SessionState::BatchSelection,
    };
    Ok(())
  }

  /// 进入提交状态。这是进入 `Submitting` 的唯一转移，且是一次性的：
  /// 已经在提交中的会话再次提交会被拒绝。
  pub fn begin_submit(&mut self) -> Result<&[PendingFile], SessionError> {
    match self.state {
      SessionState::SinglePreview | SessionState::BatchSelection => {}
      SessionState::Submitting => return Err(SessionError::AlreadySubmitting),
      _ => return Err(SessionError::InvalidTransition(self.state)),
    }

    self.state = SessionState::Submitting;
    self.progress = Progress {
      current: 0,
      total: self.files.len(),
    };
    Ok(&self.files)
  }

  /// 记录批处理进度（仅提交期间有效）
  pub fn record_progress(&mut self, progress: Progress) {
    if self.state == SessionState::Submitting {
      self.progress = progress;
    }
  }

  /// 结束提交
  pub fn finish(&mut self, success: bool) -> Result<(), SessionError> {
    if self.state != SessionState::Submitting {
      return Err(SessionError::InvalidTransition(self.state));
    }
    self.state = if success {
      SessionState::Completed
    } else {
      SessionState::Failed
    };
    Ok(())
  }

  /// 显式重置：清空全部选择与结果状态，回到空闲
  pub fn reset(&mut self) {
    self.state = SessionState::Idle;
    self.files.clear();
    self.progress = Progress { current: 0, total: 0 };
  }
}

fn filter_images(paths: &[PathBuf]) -> Vec<PendingFile> {
  paths
    .iter()
    .filter(|path| image_mime(path).is_some())
    .map(|path| PendingFile::new(path.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session() -> UploadSession {
    UploadSession::new(ModelKind::Medium)
  }

  fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
  }

  #[test]
  fn empty_selection_is_rejected_and_state_unchanged() {
    let mut s = session();
    assert_eq!(s.select_files(&[]), Err(SessionError::NoImageFiles));
    assert_eq!(s.state(), SessionState::Idle);
  }

  #[test]
  fn non_image_files_are_filtered_out() {
    let mut s = session();
    let err = s.select_files(&paths(&["notes.txt", "report.pdf"]));
    assert_eq!(err, Err(SessionError::NoImageFiles));
    assert_eq!(s.state(), SessionState::Idle);

    s.select_files(&paths(&["cat.jpg", "notes.txt"])).unwrap();
    assert_eq!(s.state(), SessionState::SinglePreview);
    assert_eq!(s.files().len(), 1);
  }

  #[test]
  fn one_file_previews_many_files_batch() {
    let mut s = session();
    s.select_files(&paths(&["cat.jpg"])).unwrap();
    assert_eq!(s.state(), SessionState::SinglePreview);

    s.select_files(&paths(&["cat.jpg", "dog.png"])).unwrap();
    assert_eq!(s.state(), SessionState::BatchSelection);
    assert!(s.is_batch());
  }

  #[test]
  fn oversized_batch_is_rejected_not_truncated() {
    let mut s = session();
    let many: Vec<PathBuf> = (0..=MAX_BATCH_FILES).map(|i| PathBuf::from(format!("{i}.jpg"))).collect();
    assert_eq!(s.select_files(&many), Err(SessionError::TooManyFiles(101)));
    assert_eq!(s.state(), SessionState::Idle);
    assert!(s.files().is_empty());
  }

  #[test]
  fn add_files_merges_under_the_cap() {
    let mut s = session();
    s.select_files(&paths(&["a.jpg", "b.jpg"])).unwrap();
    s.add_files(&paths(&["c.png"])).unwrap();
    assert_eq!(s.files().len(), 3);

    let rest: Vec<PathBuf> = (0..98).map(|i| PathBuf::from(format!("x{i}.jpg"))).collect();
    assert_eq!(s.add_files(&rest), Err(SessionError::TooManyFiles(101)));
    assert_eq!(s.files().len(), 3);
  }

  #[test]
  fn remove_file_shrinks_back_through_states() {
    let mut s = session();
    s.select_files(&paths(&["a.jpg", "b.jpg"])).unwrap();
    s.remove_file(1).unwrap();
    assert_eq!(s.state(), SessionState::SinglePreview);
    s.remove_file(0).unwrap();
    assert_eq!(s.state(), SessionState::Idle);

    assert_eq!(s.remove_file(0), Err(SessionError::InvalidTransition(SessionState::Idle)));
  }

  #[test]
  fn submit_is_one_shot() {
    let mut s = session();
    s.select_files(&paths(&["a.jpg"])).unwrap();
    let total = s.begin_submit().unwrap().len();
    assert_eq!(total, 1);
    assert_eq!(s.state(), SessionState::Submitting);
    assert_eq!(s.begin_submit().unwrap_err(), SessionError::AlreadySubmitting);
    assert_eq!(s.progress(), Progress { current: 0, total: 1 });
  }

  #[test]
  fn progress_is_only_recorded_while_submitting() {
    let mut s = session();
    s.record_progress(Progress { current: 3, total: 5 });
    assert_eq!(s.progress(), Progress { current: 0, total: 0 });

    s.select_files(&paths(&["a.jpg", "b.jpg"])).unwrap();
    s.begin_submit().unwrap();
    s.record_progress(Progress { current: 1, total: 2 });
    assert_eq!(s.progress(), Progress { current: 1, total: 2 });
  }

  #[test]
  fn finish_and_reset_round_trip() {
    let mut s = session();
    s.select_files(&paths(&["a.jpg"])).unwrap();
    s.begin_submit().unwrap();
    s.finish(true).unwrap();
    assert_eq!(s.state(), SessionState::Completed);

    // 终态只能通过显式重置离开
    let err = s.select_files(&paths(&["b.jpg"]));
    assert_eq!(err, Err(SessionError::InvalidTransition(SessionState::Completed)));

    s.reset();
    assert_eq!(s.state(), SessionState::Idle);
    assert!(s.files().is_empty());
  }

  #[test]
  fn failed_submit_ends_in_failed_state() {
    let mut s = session();
    s.select_files(&paths(&["a.jpg"])).unwrap();
    s.begin_submit().unwrap();
    s.finish(false).unwrap();
    assert_eq!(s.state(), SessionState::Failed);
  }
}
