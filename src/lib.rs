//! Push Ingest - 推送通知摄入：限时富媒体附件与单次投递的 deep link

pub mod attachment;
pub mod config;
pub mod error;
pub mod ingest;
pub mod notification;
pub mod service;

pub use attachment::{AttachmentCache, AttachmentFetchJob, CacheEntry, FetchHandle, FetchOutcome, HttpDownloader, MediaDownloader};
pub use config::PipelineConfig;
pub use error::{FetchError, FetchResult};
pub use ingest::IngestPipeline;
pub use notification::{DeepLinkDispatcher, DeepLinkHandler, NotificationContent, NotificationPayload, PayloadKind, TargetId};
pub use service::RichNotificationService;
