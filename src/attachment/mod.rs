//! 附件层 - 限时下载、扩展名推断与本地缓存

pub mod cache;
pub mod downloader;
pub mod extension;
pub mod fetch;

pub use cache::{AttachmentCache, CacheEntry};
pub use downloader::{DownloadedMedia, HttpDownloader, MediaDownloader, DEFAULT_MAX_ATTACHMENT_BYTES};
pub use extension::resolve_extension;
pub use fetch::{AttachmentFetchJob, FetchHandle, FetchOutcome, FetchPhase};
