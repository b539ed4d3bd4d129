//! 管线配置
//!
//! 读取优先级（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 配置文件 `~/.config/push-ingest/config.json`
//! 3. 环境变量 `PUSH_INGEST_CACHE_DIR`、`PUSH_INGEST_DEADLINE_MS`、`PUSH_INGEST_HTTP_TIMEOUT_MS`、
//!    `PUSH_INGEST_MAX_ATTACHMENT_BYTES`

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::attachment::downloader::DEFAULT_MAX_ATTACHMENT_BYTES;

/// 默认附件截止时间（毫秒），低于宿主约 30 秒的预算
pub const DEFAULT_DEADLINE_MS: u64 = 25_000;

/// 默认 HTTP 超时（毫秒）
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 20_000;

/// 默认缓存清理年龄（秒）
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_USER_AGENT: &str = concat!("push-ingest/", env!("CARGO_PKG_VERSION"));

pub const ENV_CACHE_DIR: &str = "PUSH_INGEST_CACHE_DIR";
pub const ENV_DEADLINE_MS: &str = "PUSH_INGEST_DEADLINE_MS";
pub const ENV_HTTP_TIMEOUT_MS: &str = "PUSH_INGEST_HTTP_TIMEOUT_MS";
pub const ENV_MAX_ATTACHMENT_BYTES: &str = "PUSH_INGEST_MAX_ATTACHMENT_BYTES";

/// 管线配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 附件缓存目录
    pub cache_dir: PathBuf,
    /// 附件下载截止时间（毫秒）
    pub deadline_ms: u64,
    /// 单次 HTTP 请求超时（毫秒）
    pub http_timeout_ms: u64,
    /// 缓存文件保留时长（秒）
    pub cache_max_age_secs: u64,
    /// 附件响应体大小上限（字节）
    pub max_attachment_bytes: u64,
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            deadline_ms: DEFAULT_DEADLINE_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            cache_max_age_secs: DEFAULT_CACHE_MAX_AGE_SECS,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// 从配置文件和环境变量自动加载
    pub fn auto_load() -> Result<Self> {
        Self::load(Self::path().as_deref(), |key| std::env::var(key).ok())
    }

    /// 配置文件路径
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/push-ingest/config.json"))
    }

    /// 按优先级合并；文件不存在不是错误，格式错误是
    pub fn load(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                debug!(path = %path.display(), "Loaded pipeline config file");
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            _ => Self::default(),
        };

        if let Some(dir) = env(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(ms) = env(ENV_DEADLINE_MS) {
            config.deadline_ms = ms
                .parse()
                .with_context(|| format!("{} must be milliseconds, got {:?}", ENV_DEADLINE_MS, ms))?;
        }
        if let Some(ms) = env(ENV_HTTP_TIMEOUT_MS) {
            config.http_timeout_ms = ms
                .parse()
                .with_context(|| format!("{} must be milliseconds, got {:?}", ENV_HTTP_TIMEOUT_MS, ms))?;
        }
        if let Some(bytes) = env(ENV_MAX_ATTACHMENT_BYTES) {
            config.max_attachment_bytes = bytes
                .parse()
                .with_context(|| format!("{} must be a byte count, got {:?}", ENV_MAX_ATTACHMENT_BYTES, bytes))?;
        }

        Ok(config)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("push-ingest")
        .join("attachments")
}
