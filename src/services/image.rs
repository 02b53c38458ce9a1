//! 图片内联 - 业务能力层
//!
//! 把题目中的图片 URL 下载并编码为 data URI，供多模态模型使用。
//! 下载失败只记录日志，不会让答题失败。

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use tracing::{error, info, warn};

use crate::config::Config;

const DEFAULT_MIME: &str = "image/jpeg";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 已下载的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub url: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// 非 image/* 的类型统一按 JPEG 处理
    pub fn new(url: impl Into<String>, mime: Option<&str>, data: Vec<u8>) -> Self {
        let mime = mime
            .map(|m| m.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        Self {
            url: url.into(),
            mime,
            data,
        }
    }

    /// 解析调用方直接传入的 `data:image/...;base64,...`
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?;
        if data.is_empty() {
            return None;
        }
        Some(Self::new(uri, Some(mime), data))
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// 图片下载器
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 尽力下载，失败返回 `None`
    async fn fetch_as_inline(&self, url: &str) -> Option<InlineImage>;
}

/// 基于 reqwest 的图片下载器，带浏览器请求头和 Referer
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_options(config.image_fetch_timeout(), &config.image_referer)
    }

    pub fn with_options(timeout: Duration, referer: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
        if !referer.is_empty() {
            headers.insert(REFERER, HeaderValue::from_str(referer)?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_as_inline(&self, url: &str) -> Option<InlineImage> {
        if url.starts_with("data:") {
            return InlineImage::from_data_uri(url);
        }

        info!("📥 下载图片: {}", url);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("❌ 图片下载失败: {} - {}", url, e);
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("❌ 图片下载失败: {} - HTTP {}", url, status.as_u16());
            return None;
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(bytes) if !bytes.is_empty() => {
                info!("✅ 图片下载成功，大小: {} bytes", bytes.len());
                Some(InlineImage::new(url, mime.as_deref(), bytes.to_vec()))
            }
            Ok(_) => {
                warn!("⚠️ 图片内容为空: {}", url);
                None
            }
            Err(e) => {
                error!("❌ 图片读取失败: {} - {}", url, e);
                None
            }
        }
    }
}

/// 批量内联图片，失败的 URL 直接丢弃
pub async fn materialize(fetcher: &dyn ImageFetcher, urls: &[String]) -> Vec<InlineImage> {
    if urls.is_empty() {
        return Vec::new();
    }

    let results = join_all(urls.iter().map(|url| fetcher.fetch_as_inline(url))).await;
    let images: Vec<InlineImage> = results.into_iter().flatten().collect();

    if images.len() < urls.len() {
        warn!(
            "⚠️ {} 张图片中有 {} 张未能下载，已从请求中移除",
            urls.len(),
            urls.len() - images.len()
        );
    }
    images
}
