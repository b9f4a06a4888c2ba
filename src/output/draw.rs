// 该文件是 Yunmu （云目） 项目的一部分。
// src/output/draw.rs - 检测覆盖层渲染
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{Detection, ModelResult};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_BG_HORIZONTAL_PADDING: u32 = 10;

/// 覆盖层调色板，按检测序号取模循环。固定顺序保证同一份检测列表
/// 每次重绘得到完全相同的着色。
pub const PALETTE: [Rgb<u8>; 10] = [
  Rgb([0xFF, 0x6B, 0x6B]),
  Rgb([0x4E, 0xCD, 0xC4]),
  Rgb([0x45, 0xB7, 0xD1]),
  Rgb([0xFF, 0xA0, 0x7A]),
  Rgb([0x98, 0xD8, 0xC8]),
  Rgb([0xF7, 0xDC, 0x6F]),
  Rgb([0xBB, 0x8F, 0xCE]),
  Rgb([0x85, 0xC1, 0xE2]),
  Rgb([0xF8, 0xB7, 0x39]),
  Rgb([0x52, 0xB7, 0x88]),
];

/// 渲染（屏显）尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSize {
  pub width: u32,
  pub height: u32,
}

/// 绘制指令。计划与执行分离：缩放几何是纯计算，落像素的执行器
/// 不携带任何状态。
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
  /// 检测框
  HollowRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
  },
  /// 标签背景
  FilledRect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
  },
  /// 标签文字（白色）
  Text { x: i32, y: i32, text: String },
}

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
}

/// 把自然像素坐标系下的检测列表换算成渲染尺寸下的绘制指令。
///
/// 缩放因子为 渲染宽 / 自然宽 与 渲染高 / 自然高；自然尺寸缺失时
/// 按 1:1 处理而不报错。零几何的占位检测与空列表不产生任何指令。
pub fn plan_overlay(
  detections: &[Detection],
  natural: Option<(u32, u32)>,
  rendered: RenderSize,
) -> Vec<DrawCommand> {
  let (scale_x, scale_y) = match natural {
    Some((w, h)) if w > 0 && h > 0 => (
      rendered.width as f32 / w as f32,
      rendered.height as f32 / h as f32,
    ),
    _ => (1.0, 1.0),
  };

  let mut commands = Vec::new();
  for (index, det) in detections.iter().enumerate() {
    let Some([x1, y1, x2, y2]) = det.bbox else {
      // 旧版占位检测没有几何信息
      continue;
    };

    let color = PALETTE[index % PALETTE.len()];
    let scaled_x = (x1 * scale_x).floor() as i32;
    let scaled_y = (y1 * scale_y).floor() as i32;
    let box_width = ((x2 - x1) * scale_x).ceil() as u32;
    let box_height = ((y2 - y1) * scale_y).ceil() as u32;

    if box_width == 0 || box_height == 0 {
      continue;
    }

    commands.push(DrawCommand::HollowRect {
      x: scaled_x,
      y: scaled_y,
      width: box_width,
      height: box_height,
      color,
    });

    let label = match det.confidence {
      Some(confidence) => format!("{} {}%", det.class, (confidence * 100.0).round() as u32),
      None => det.class.clone(),
    };
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as u32 + LABEL_BG_HORIZONTAL_PADDING;
    let label_y = (scaled_y - LABEL_TEXT_HEIGHT).max(0);

    commands.push(DrawCommand::FilledRect {
      x: scaled_x.max(0),
      y: label_y,
      width: text_width,
      height: LABEL_TEXT_HEIGHT as u32,
      color,
    });
    commands.push(DrawCommand::Text {
      x: scaled_x.max(0) + 5,
      y: label_y + LABEL_TEXT_VERTICAL_PADDING,
      text: label,
    });
  }

  commands
}

/// 覆盖层画笔：把绘制指令落到像素上。
pub struct OverlayPainter {
  font: Option<FontArc>,
  font_scale: PxScale,
}

/// 常见系统字体位置，按顺序尝试
const FONT_CANDIDATES: [&str; 3] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

impl OverlayPainter {
  /// 加载标签字体：先试显式路径，再试常见系统字体。
  /// 找不到字体时仍可绘制边框，只是跳过文字。
  pub fn new(font_path: Option<&Path>) -> Self {
    let font = font_path
      .into_iter()
      .map(Path::to_path_buf)
      .chain(FONT_CANDIDATES.into_iter().map(PathBuf::from))
      .find_map(|candidate| {
        let data = std::fs::read(&candidate).ok()?;
        let font = FontArc::try_from_vec(data).ok()?;
        debug!("标签字体: {}", candidate.display());
        Some(font)
      });

    if font.is_none() {
      warn!("未找到标签字体，覆盖层将只绘制边框并跳过文字");
    }

    OverlayPainter {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  /// 在源图像的副本上执行绘制指令。
  /// 每次调用都从原图重新开始，输入不变时重复调用得到完全相同的结果，
  /// 不会叠加上一次的旧框。
  pub fn paint(&self, image: &RgbImage, commands: &[DrawCommand]) -> RgbImage {
    let mut canvas = image.clone();
    let white = Rgb([255u8, 255u8, 255u8]);

    for command in commands {
      match command {
        DrawCommand::HollowRect {
          x,
          y,
          width,
          height,
          color,
        } => {
          let rect = Rect::at(*x, *y).of_size(*width, *height);
          draw_hollow_rect_mut(&mut canvas, rect, *color);

          // 第二道内框，加粗到 2 像素
          if *width > 2 && *height > 2 {
            let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
            draw_hollow_rect_mut(&mut canvas, inner, *color);
          }
        }
        DrawCommand::FilledRect {
          x,
          y,
          width,
          height,
          color,
        } => {
          let rect = Rect::at(*x, *y).of_size(*width, *height);
          draw_filled_rect_mut(&mut canvas, rect, *color);
        }
        DrawCommand::Text { x, y, text } => {
          if let Some(font) = &self.font {
            draw_text_mut(&mut canvas, white, *x, *y, self.font_scale, font, text);
          }
        }
      }
    }

    canvas
  }

  /// 对一条模型结果渲染覆盖层。
  /// `rendered` 是目标（屏显）尺寸，与原图不一致时先缩放图像；
  /// 缺省时按原图尺寸渲染。
  pub fn render(
    &self,
    image: &RgbImage,
    result: &ModelResult,
    rendered: Option<RenderSize>,
  ) -> RgbImage {
    let rendered = rendered.unwrap_or(RenderSize {
      width: image.width(),
      height: image.height(),
    });

    let base = if (image.width(), image.height()) == (rendered.width, rendered.height) {
      image.clone()
    } else {
      image::imageops::resize(
        image,
        rendered.width,
        rendered.height,
        image::imageops::FilterType::Triangle,
      )
    };

    let commands = plan_overlay(&result.detections, result.natural_size(), rendered);
    self.paint(&base, &commands)
  }
}

/// 异步读取并解码一张图像。
/// 绘制必须等图像加载完成后进行：画笔只接受已经解码的图像。
pub async fn load_rgb_image(path: &Path) -> Result<RgbImage, DrawError> {
  let bytes = tokio::fs::read(path).await?;
  let image = image::load_from_memory(&bytes)?;
  Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(class: &str, confidence: f32, bbox: [f32; 4]) -> Detection {
    Detection {
      class: class.to_string(),
      confidence: Some(confidence),
      bbox: Some(bbox),
    }
  }

  const RENDERED: RenderSize = RenderSize {
    width: 100,
    height: 50,
  };

  #[test]
  fn boxes_scale_from_natural_to_rendered_space() {
    // 自然 200x100，渲染 100x50：坐标折半
    let dets = vec![detection("cat", 0.9, [20.0, 40.0, 60.0, 80.0])];
    let commands = plan_overlay(&dets, Some((200, 100)), RENDERED);

    let DrawCommand::HollowRect {
      x,
      y,
      width,
      height,
      ..
    } = &commands[0]
    else {
      panic!("第一条指令应为检测框");
    };
    assert_eq!((*x, *y), (10, 20));
    assert_eq!((*width, *height), (20, 20));
  }

  #[test]
  fn missing_natural_size_degenerates_to_identity() {
    let dets = vec![detection("cat", 0.9, [3.0, 4.0, 13.0, 24.0])];
    let commands = plan_overlay(&dets, None, RENDERED);

    let DrawCommand::HollowRect {
      x,
      y,
      width,
      height,
      ..
    } = &commands[0]
    else {
      panic!("第一条指令应为检测框");
    };
    assert_eq!((*x, *y), (3, 4));
    assert_eq!((*width, *height), (10, 20));
  }

  #[test]
  fn zero_natural_size_also_degenerates_to_identity() {
    let dets = vec![detection("cat", 0.9, [1.0, 1.0, 2.0, 2.0])];
    let with_zero = plan_overlay(&dets, Some((0, 0)), RENDERED);
    let with_none = plan_overlay(&dets, None, RENDERED);
    assert_eq!(with_zero, with_none);
  }

  #[test]
  fn label_text_carries_class_and_rounded_percent() {
    let dets = vec![detection("dog", 0.876, [0.0, 30.0, 10.0, 40.0])];
    let commands = plan_overlay(&dets, None, RENDERED);

    let Some(DrawCommand::Text { text, .. }) = commands.last() else {
      panic!("最后一条指令应为标签文字");
    };
    assert_eq!(text, "dog 88%");
  }

  #[test]
  fn palette_recycles_deterministically_by_index() {
    let dets: Vec<Detection> = (0..12)
      .map(|i| detection("cat", 0.9, [i as f32 * 10.0, 0.0, i as f32 * 10.0 + 5.0, 5.0]))
      .collect();
    let commands = plan_overlay(&dets, None, RENDERED);

    let colors: Vec<Rgb<u8>> = commands
      .iter()
      .filter_map(|c| match c {
        DrawCommand::HollowRect { color, .. } => Some(*color),
        _ => None,
      })
      .collect();
    assert_eq!(colors.len(), 12);
    assert_eq!(colors[0], PALETTE[0]);
    assert_eq!(colors[9], PALETTE[9]);
    // 第 11、12 个检测绕回调色板开头
    assert_eq!(colors[10], PALETTE[0]);
    assert_eq!(colors[11], PALETTE[1]);

    // 同一份列表重绘，着色完全一致
    assert_eq!(commands, plan_overlay(&dets, None, RENDERED));
  }

  #[test]
  fn empty_and_placeholder_detections_draw_nothing() {
    assert!(plan_overlay(&[], Some((10, 10)), RENDERED).is_empty());

    let placeholders = vec![Detection::placeholder("cat"), Detection::placeholder("dog")];
    assert!(plan_overlay(&placeholders, Some((10, 10)), RENDERED).is_empty());
  }

  #[test]
  fn painting_is_idempotent_and_leaves_source_untouched() {
    let base = RgbImage::from_pixel(64, 64, Rgb([7u8, 7u8, 7u8]));
    let dets = vec![detection("cat", 0.5, [8.0, 8.0, 40.0, 40.0])];
    let commands = plan_overlay(&dets, None, RenderSize { width: 64, height: 64 });

    let painter = OverlayPainter {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    };
    let first = painter.paint(&base, &commands);
    let second = painter.paint(&base, &commands);
    assert_eq!(first.as_raw(), second.as_raw());
    // 源图像不被修改
    assert!(base.pixels().all(|p| *p == Rgb([7u8, 7u8, 7u8])));
  }
}
