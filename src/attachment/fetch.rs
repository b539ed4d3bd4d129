//! 附件下载任务 - 在截止时间内下载并缓存媒体，结果恰好上报一次
//!
//! # 状态
//! `Idle -> Downloading -> {Attached, Unattached}`，截止时间（或宿主的 `expire()`）
//! 可以在任何非终态把任务强制结束为 `Unattached`。
//!
//! 下载完成与截止时间两条路径竞争同一个回调槽：谁先 `take()` 到回调谁上报，
//! 后到的一方什么都不做。截止时间先到时会中止仍在进行的下载；
//! 下载已经落盘但输掉竞争的文件会被删除。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{AttachmentCache, CacheEntry};
use super::downloader::MediaDownloader;
use super::extension::resolve_extension;
use crate::error::FetchResult;

/// 任务终态结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 已落盘的附件
    Attached(CacheEntry),
    /// 无附件（失败或超时）
    Unattached,
}

impl FetchOutcome {
    pub fn is_attached(&self) -> bool {
        matches!(self, FetchOutcome::Attached(_))
    }
}

/// 任务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Downloading,
    Attached,
    Unattached,
}

type ResultCallback = Box<dyn FnOnce(FetchOutcome) + Send + 'static>;

struct CompletionState {
    phase: FetchPhase,
    on_result: Option<ResultCallback>,
}

/// 单次上报守卫
struct Completion {
    state: Mutex<CompletionState>,
    /// 上报后唤醒计时任务
    done: Notify,
}

impl Completion {
    fn new(on_result: ResultCallback) -> Self {
        Self {
            state: Mutex::new(CompletionState {
                phase: FetchPhase::Idle,
                on_result: Some(on_result),
            }),
            done: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CompletionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn phase(&self) -> FetchPhase {
        self.lock().phase
    }

    fn begin(&self) {
        let mut state = self.lock();
        if state.phase == FetchPhase::Idle {
            state.phase = FetchPhase::Downloading;
        }
    }

    /// 下载成功落盘；回调已被截止路径取走时把条目原样退回
    fn land(&self, entry: CacheEntry) -> Result<(), CacheEntry> {
        let mut state = self.lock();
        match state.on_result.take() {
            Some(callback) => {
                state.phase = FetchPhase::Attached;
                drop(state);
                self.done.notify_one();
                callback(FetchOutcome::Attached(entry));
                Ok(())
            }
            None => Err(entry),
        }
    }

    /// 以 `Unattached` 结束；返回是否由本次调用上报
    ///
    /// 落盘与上报在 `land` 的同一临界区内完成，不存在"已落盘未上报"的窗口，
    /// 所以截止路径到这里时只可能上报 `Unattached`。
    fn give_up(&self) -> bool {
        let mut state = self.lock();
        match state.on_result.take() {
            Some(callback) => {
                state.phase = FetchPhase::Unattached;
                drop(state);
                self.done.notify_one();
                callback(FetchOutcome::Unattached);
                true
            }
            None => false,
        }
    }
}

/// 附件下载任务
pub struct AttachmentFetchJob {
    source: String,
    deadline: Duration,
    downloader: Arc<dyn MediaDownloader>,
    cache: AttachmentCache,
}

impl AttachmentFetchJob {
    pub fn new(
        source: impl Into<String>,
        deadline: Duration,
        downloader: Arc<dyn MediaDownloader>,
        cache: AttachmentCache,
    ) -> Self {
        Self {
            source: source.into(),
            deadline,
            downloader,
            cache,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 启动下载，`on_result` 恰好被调用一次
    ///
    /// 需要在 tokio runtime 内调用。
    pub fn start<F>(self, on_result: F) -> FetchHandle
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let completion = Arc::new(Completion::new(Box::new(on_result)));
        completion.begin();

        let Self {
            source,
            deadline,
            downloader,
            cache,
        } = self;

        debug!(source = %source, deadline_ms = deadline.as_millis() as u64, "Starting attachment fetch");

        let download = {
            let completion = completion.clone();
            tokio::spawn(async move {
                let entry = match fetch_and_store(downloader.as_ref(), &cache, &source).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(source = %source, error = %e, "Attachment fetch failed, delivering without media");
                        completion.give_up();
                        return;
                    }
                };

                // store 之后没有 await 点，abort 无法插在落盘与上报之间
                if settle(&completion, &cache, entry) {
                    info!(source = %source, "Attachment ready");
                }
            })
        };

        let timer = {
            let completion = completion.clone();
            let download = download.abort_handle();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        if completion.give_up() {
                            download.abort();
                            info!(deadline_ms = deadline.as_millis() as u64, "Attachment deadline reached, delivering without media");
                        }
                    }
                    _ = completion.done.notified() => {}
                }
            })
        };

        FetchHandle {
            completion,
            download,
            timer,
        }
    }

    /// `start` 的 future 形式
    pub async fn run(self) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        let _handle = self.start(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(FetchOutcome::Unattached)
    }
}

/// 运行中任务的句柄
pub struct FetchHandle {
    completion: Arc<Completion>,
    download: JoinHandle<()>,
    timer: JoinHandle<()>,
}

impl FetchHandle {
    /// 宿主通知时间即将耗尽：立即以 `Unattached` 上报（已上报则无操作）
    pub fn expire(&self) {
        if self.completion.give_up() {
            self.download.abort();
            info!("Attachment fetch expired by host, delivering without media");
        }
    }

    pub fn phase(&self) -> FetchPhase {
        self.completion.phase()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase(), FetchPhase::Attached | FetchPhase::Unattached)
    }

    /// 等待后台任务全部退出
    pub async fn join(self) {
        let _ = self.download.await;
        let _ = self.timer.await;
    }
}

/// 上报已落盘的附件；输掉竞争时删除文件，返回是否由本次上报
fn settle(completion: &Completion, cache: &AttachmentCache, entry: CacheEntry) -> bool {
    match completion.land(entry) {
        Ok(()) => true,
        Err(orphan) => {
            debug!(path = %orphan.path().display(), "Attachment landed after deadline, discarding");
            if let Err(e) = cache.remove(&orphan) {
                warn!(path = %orphan.path().display(), error = %e, "Failed to remove discarded attachment");
            }
            false
        }
    }
}

async fn fetch_and_store(
    downloader: &dyn MediaDownloader,
    cache: &AttachmentCache,
    source: &str,
) -> FetchResult<CacheEntry> {
    let media = downloader.download(source).await?;
    let extension = resolve_extension(media.content_type.as_deref(), source);
    Ok(cache.store(&media.bytes, &extension)?)
}
