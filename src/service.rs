//! 富通知服务 - 宿主扩展进程的入口
//!
//! 宿主收到通知后调用 [`RichNotificationService::did_receive`]，
//! 在截止时间内交回带 0 或 1 个附件的内容；宿主即将回收进程时调用
//! [`RichNotificationService::time_will_expire`]，正在进行的下载立即以无附件结束。
//! 两种情况下 `deliver` 都恰好被调用一次。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::attachment::{AttachmentCache, AttachmentFetchJob, FetchHandle, FetchOutcome, HttpDownloader, MediaDownloader};
use crate::config::PipelineConfig;
use crate::notification::content::NotificationContent;
use crate::notification::payload;

/// 富通知服务
pub struct RichNotificationService {
    downloader: Arc<dyn MediaDownloader>,
    cache: AttachmentCache,
    deadline: Duration,
    in_flight: Mutex<Option<FetchHandle>>,
}

impl RichNotificationService {
    pub fn new(downloader: Arc<dyn MediaDownloader>, cache: AttachmentCache, deadline: Duration) -> Self {
        Self {
            downloader,
            cache,
            deadline,
            in_flight: Mutex::new(None),
        }
    }

    /// 按配置创建 HTTP 下载器和缓存目录
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let downloader =
            HttpDownloader::new(config.http_timeout(), &config.user_agent)?.with_max_bytes(config.max_attachment_bytes);
        let cache = AttachmentCache::new(&config.cache_dir)?;
        Ok(Self::new(Arc::new(downloader), cache, config.deadline()))
    }

    pub fn cache(&self) -> &AttachmentCache {
        &self.cache
    }

    /// 处理一条通知，`deliver` 恰好被调用一次
    ///
    /// 没有附件地址时同步交付。需要在 tokio runtime 内调用。
    pub fn did_receive<F>(&self, raw: &Map<String, Value>, deliver: F)
    where
        F: FnOnce(NotificationContent) + Send + 'static,
    {
        let content = NotificationContent::from_raw(raw);

        let Some(source) = payload::attachment_source(raw) else {
            debug!("No attachment reference, delivering content as is");
            deliver(content);
            return;
        };

        let job = AttachmentFetchJob::new(source, self.deadline, self.downloader.clone(), self.cache.clone());
        let handle = job.start(move |outcome| {
            let content = match outcome {
                FetchOutcome::Attached(entry) => content.with_attachment(entry),
                FetchOutcome::Unattached => content,
            };
            deliver(content);
        });

        let previous = self.lock_in_flight().replace(handle);
        if let Some(previous) = previous {
            // 上一条通知不应再占用时间预算
            previous.expire();
        }
    }

    /// 宿主通知时间即将耗尽
    pub fn time_will_expire(&self) {
        let handle = self.lock_in_flight().take();
        match handle {
            Some(handle) if !handle.is_finished() => {
                info!("Service time will expire, forcing delivery");
                handle.expire();
            }
            _ => debug!("Service time will expire, nothing in flight"),
        }
    }

    /// `did_receive` 的 future 形式
    pub async fn receive(&self, raw: &Map<String, Value>) -> NotificationContent {
        let (tx, rx) = oneshot::channel();
        self.did_receive(raw, move |content| {
            let _ = tx.send(content);
        });
        // 回调恰好一次，发送端只会在发送后被丢弃
        rx.await.unwrap_or_else(|_| NotificationContent::from_raw(raw))
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<FetchHandle>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::DownloadedMedia;
    use crate::error::FetchResult;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    struct SlowDownloader {
        delay: Duration,
    }

    #[async_trait]
    impl MediaDownloader for SlowDownloader {
        async fn download(&self, _source: &str) -> FetchResult<DownloadedMedia> {
            tokio::time::sleep(self.delay).await;
            Ok(DownloadedMedia {
                bytes: vec![1, 2, 3],
                content_type: Some("image/webp".to_string()),
            })
        }
    }

    fn service(delay_ms: u64, deadline_ms: u64, dir: &std::path::Path) -> RichNotificationService {
        RichNotificationService::new(
            Arc::new(SlowDownloader {
                delay: Duration::from_millis(delay_ms),
            }),
            AttachmentCache::new(dir).unwrap(),
            Duration::from_millis(deadline_ms),
        )
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_attachment_delivers_synchronously() {
        let dir = tempdir().unwrap();
        let service = service(10, 1000, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        service.did_receive(&raw(json!({"aps": {"alert": "hi"}, "type": "event", "id": 1})), move |content| {
            tx.send(content).unwrap();
        });

        let content = rx.try_recv().unwrap();
        assert_eq!(content.body.as_deref(), Some("hi"));
        assert!(!content.has_attachment());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachment_added_before_deadline() {
        let dir = tempdir().unwrap();
        let service = service(10, 1000, dir.path());

        let content = service
            .receive(&raw(json!({"aps": {"alert": "hi"}, "image_url": "https://cdn/x"})))
            .await;

        assert_eq!(content.attachments.len(), 1);
        assert_eq!(content.attachments[0].type_hint, "webp");
        assert!(content.attachments[0].file.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_will_expire_forces_delivery() {
        let dir = tempdir().unwrap();
        let service = service(10_000, 20_000, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        service.did_receive(&raw(json!({"image_url": "https://cdn/x.png"})), move |content| {
            tx.send(content).unwrap();
        });
        assert!(rx.try_recv().is_err());

        service.time_will_expire();
        let content = rx.try_recv().unwrap();
        assert!(!content.has_attachment());

        // 之后既不会再次交付，也不会留下文件
        service.time_will_expire();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(std::fs::read_dir(service.cache().dir()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_request_expires_previous() {
        let dir = tempdir().unwrap();
        let service = service(10_000, 20_000, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        service.did_receive(&raw(json!({"image_url": "https://cdn/1.png", "n": 1})), move |content| {
            first.send(content).unwrap();
        });
        service.did_receive(&raw(json!({"image_url": "https://cdn/2.png", "n": 2})), move |content| {
            tx.send(content).unwrap();
        });

        let content = rx.try_recv().unwrap();
        assert_eq!(content.user_info.get("n"), Some(&json!(1)));
        assert!(!content.has_attachment());
    }
}
