// 该文件是 Yunmu （云目） 项目的一部分。
// src/remote.rs - 远程推理服务客户端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::model::ModelKind;
use crate::session::image_mime;

/// 推理接口路径
const PREDICT_PATH: &str = "/api/predict_with_boxes";
/// 健康检查路径
const HEALTH_PATH: &str = "/api/health";
/// 默认单次请求超时。悬挂的请求在严格串行模式下会阻塞整个批次，
/// 因此必须有显式超时兜底。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("服务地址非法: {0}")]
  InvalidBaseUrl(String),
  #[error("请求失败: {0}")]
  Transport(#[from] reqwest::Error),
  #[error("服务端返回错误状态 {status}: {body}")]
  Status { status: u16, body: String },
}

/// 推理服务边界。
///
/// 编排器只依赖该 trait，测试可以用脚本化的伪实现替换网络往返。
pub trait InferenceBackend {
  /// 对一张图像执行一次远程推理，返回服务端的原始 JSON 响应；
  /// 任何非成功状态或传输失败都化为不透明的失败原因。
  fn infer(
    &self,
    image: &[u8],
    filename: &str,
    model: ModelKind,
  ) -> impl Future<Output = Result<Value, RemoteError>>;
}

impl<B: InferenceBackend> InferenceBackend for &B {
  async fn infer(
    &self,
    image: &[u8],
    filename: &str,
    model: ModelKind,
  ) -> Result<Value, RemoteError> {
    (**self).infer(image, filename, model).await
  }
}

/// 基于 HTTP 的推理客户端
pub struct HttpInference {
  client: reqwest::Client,
  predict: Url,
  health: Url,
}

/// HTTP 客户端构造器
pub struct HttpInferenceBuilder {
  base: Url,
  timeout: Duration,
}

impl HttpInferenceBuilder {
  pub fn new(base: Url) -> Self {
    HttpInferenceBuilder {
      base,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  /// 设置单次请求超时
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn build(self) -> Result<HttpInference, RemoteError> {
    let predict = self
      .base
      .join(PREDICT_PATH)
      .map_err(|e| RemoteError::InvalidBaseUrl(format!("{}: {}", self.base, e)))?;
    let health = self
      .base
      .join(HEALTH_PATH)
      .map_err(|e| RemoteError::InvalidBaseUrl(format!("{}: {}", self.base, e)))?;

    info!("推理服务地址: {}", predict);
    debug!("单次请求超时: {:?}", self.timeout);

    let client = reqwest::Client::builder().timeout(self.timeout).build()?;

    Ok(HttpInference {
      client,
      predict,
      health,
    })
  }
}

impl HttpInference {
  /// 轻量连通性探测。失败只用于告警，不阻止批处理开始。
  pub async fn check_health(&self) -> Result<(), RemoteError> {
    let response = self.client.get(self.health.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Status {
        status: status.as_u16(),
        body: truncate_body(&response.text().await.unwrap_or_default()),
      });
    }
    Ok(())
  }
}

impl InferenceBackend for HttpInference {
  async fn infer(
    &self,
    image: &[u8],
    filename: &str,
    model: ModelKind,
  ) -> Result<Value, RemoteError> {
    let mime = image_mime(Path::new(filename)).unwrap_or("application/octet-stream");
    let part = multipart::Part::bytes(image.to_vec())
      .file_name(filename.to_string())
      .mime_str(mime)?;
    let form = multipart::Form::new()
      .part("image", part)
      .text("model", model.form_value());

    debug!("上传 {} ({} 字节), 模型: {}", filename, image.len(), model);
    let response = self.client.post(self.predict.clone()).multipart(form).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = truncate_body(&response.text().await.unwrap_or_default());
      return Err(RemoteError::Status {
        status: status.as_u16(),
        body,
      });
    }

    Ok(response.json::<Value>().await?)
  }
}

/// 错误响应正文截断，避免把整页 HTML 灌进日志
fn truncate_body(body: &str) -> String {
  const MAX: usize = 200;
  if body.len() <= MAX {
    body.to_string()
  } else {
    let mut end = MAX;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}...", &body[..end])
  }
}
