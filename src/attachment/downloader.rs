//! 媒体下载
//!
//! `MediaDownloader` 是下载任务与网络之间的接缝，测试中用内存实现替换。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{FetchError, FetchResult};

/// 下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    /// 响应声明的 Content-Type
    pub content_type: Option<String>,
}

#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// 下载 `source`，非 2xx 视为失败
    async fn download(&self, source: &str) -> FetchResult<DownloadedMedia>;
}

/// 默认附件大小上限（字节）
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// 基于 reqwest 的 HTTP 下载器
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    max_bytes: u64,
}

impl HttpDownloader {
    pub fn new(timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        })
    }

    /// 设置响应体大小上限，超出即放弃下载
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, source: &str) -> FetchResult<DownloadedMedia> {
        let url = Url::parse(source).map_err(|_| FetchError::InvalidSource(source.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidSource(source.to_string()));
        }

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let limit = self.max_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::TooLarge { limit });
        }

        // Content-Length 可能缺失或不实，按块读取并累计
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() as u64 + chunk.len() as u64 > limit {
                return Err(FetchError::TooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(source, bytes = bytes.len(), content_type = ?content_type, "Attachment downloaded");

        Ok(DownloadedMedia { bytes, content_type })
    }
}
