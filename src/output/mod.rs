// 该文件是 Yunmu （云目） 项目的一部分。
// src/output/mod.rs - 输出模块
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub mod draw;
mod save_image_file;

pub use draw::{DrawCommand, DrawError, OverlayPainter, PALETTE, RenderSize, load_rgb_image, plan_overlay};
pub use save_image_file::{FolderOutput, SaveImageFileOutput};

use anyhow::Result;
use image::RgbImage;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 覆盖层图像写入器 trait
pub trait OverlayWriter {
  /// 写入一张已绘制覆盖层的图像，`name` 不含扩展名；返回落盘路径
  fn write_image(&mut self, name: &str, image: &RgbImage) -> Result<std::path::PathBuf>;
}

/// 按 URL 方案创建覆盖层写入器
/// 支持格式:
/// - image:///path/to/out.png 单文件输出
/// - folder:///path/to/dir 目录输出
/// - 裸路径视为目录输出
pub fn create_overlay_writer(output: &str) -> Result<Box<dyn OverlayWriter>> {
  match Url::parse(output) {
    Ok(url) if url.scheme() == SaveImageFileOutput::SCHEME => {
      Ok(Box::new(SaveImageFileOutput::from_url(&url)?))
    }
    Ok(url) if url.scheme() == FolderOutput::SCHEME => Ok(Box::new(FolderOutput::from_url(&url)?)),
    Ok(url) => anyhow::bail!("不支持的输出方案: {}", url.scheme()),
    // 没有方案的裸路径视为目录
    Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Box::new(FolderOutput::from_path(output))),
    Err(e) => Err(e.into()),
  }
}
