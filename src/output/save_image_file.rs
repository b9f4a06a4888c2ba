// 该文件是 Yunmu （云目） 项目的一部分。
// src/output/save_image_file.rs - 保存覆盖层图像文件
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

use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::output::OverlayWriter;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
}

/// 单文件输出。
/// 批处理写入多张时，第二张起在文件名上追加序号。
pub struct SaveImageFileOutput {
  path: PathBuf,
  written: u32,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: uri.scheme().to_string(),
      });
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      written: 0,
    })
  }
}

impl OverlayWriter for SaveImageFileOutput {
  fn write_image(&mut self, _name: &str, image: &RgbImage) -> Result<PathBuf> {
    let path = if self.written == 0 {
      self.path.clone()
    } else {
      // out.png -> out-2.png
      let stem = self
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      let ext = self
        .path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
      self
        .path
        .with_file_name(format!("{}-{}.{}", stem, self.written + 1, ext))
    };

    save_to(&path, image)?;
    self.written += 1;
    Ok(path)
  }
}

/// 目录输出：每张图像按条目名写成 <name>.png
pub struct FolderOutput {
  directory: PathBuf,
}

impl FolderOutput {
  pub fn from_path(path: &str) -> Self {
    FolderOutput {
      directory: PathBuf::from(path),
    }
  }
}

impl FromUrlWithScheme for FolderOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FolderOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: uri.scheme().to_string(),
      });
    }

    Ok(FolderOutput {
      directory: PathBuf::from(uri.path()),
    })
  }
}

impl OverlayWriter for FolderOutput {
  fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<PathBuf> {
    let path = self.directory.join(format!("{}.png", name));
    save_to(&path, image)?;
    Ok(path)
  }
}

fn save_to(path: &Path, image: &RgbImage) -> Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  image.save(path)?;
  info!("保存覆盖层图像: {}", path.display());
  Ok(())
}
