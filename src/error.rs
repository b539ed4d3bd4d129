//! 错误类型
//!
//! 附件下载链路的失败都会在任务边界降级为 `FetchOutcome::Unattached`，
//! 这里的类型只用于日志和测试断言。

use thiserror::Error;

/// 附件下载 / 缓存失败
#[derive(Debug, Error)]
pub enum FetchError {
    /// 来源不是可下载的 URL
    #[error("invalid attachment source: {0}")]
    InvalidSource(String),

    /// 网络错误（连接、超时、读取响应体）
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// 非 2xx 响应
    #[error("unexpected status: {0}")]
    Status(u16),

    /// 响应体超过大小上限
    #[error("attachment exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    /// 写入缓存失败
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        assert_eq!(FetchError::Status(404).to_string(), "unexpected status: 404");
        assert_eq!(
            FetchError::InvalidSource("ftp://x".to_string()).to_string(),
            "invalid attachment source: ftp://x"
        );
        assert_eq!(FetchError::TooLarge { limit: 1024 }.to_string(), "attachment exceeds 1024 bytes");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: FetchError = io.into();
        assert!(matches!(err, FetchError::Io(_)));
    }
}
