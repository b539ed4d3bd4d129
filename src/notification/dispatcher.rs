//! Deep-link 分发器 - 把通知 payload 恰好一次地交给当前 UI 持有者
//!
//! # 状态
//! (是否注册 handler, 是否有缓冲 payload) 四种组合，初始为 (无, 无)：
//! - payload 到达：有 handler 立即投递；否则放入缓冲（覆盖旧的）
//! - 注册 handler：替换旧 handler；缓冲非空时立即投递并清空
//! - 注销 handler：只清 handler，不动缓冲
//!
//! 所有操作在同一把锁下串行执行，投递也在锁内完成，保证投递顺序与到达顺序一致。
//! 因此 handler 必须是非阻塞的，且不能同步回调分发器；需要在别处处理时用
//! [`ChannelHandler`] 转发到 channel。

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::buffer::PendingPayloadBuffer;
use super::payload::NotificationPayload;

/// Deep-link 消费方
pub trait DeepLinkHandler: Send + Sync {
    /// 接收 payload（所有权转移，同一 payload 不会被投递第二次）
    fn handle(&self, payload: NotificationPayload);
}

impl<F> DeepLinkHandler for F
where
    F: Fn(NotificationPayload) + Send + Sync,
{
    fn handle(&self, payload: NotificationPayload) {
        self(payload)
    }
}

/// 把 payload 转发到 tokio channel 的 handler
pub struct ChannelHandler {
    sender: UnboundedSender<NotificationPayload>,
}

impl ChannelHandler {
    pub fn new(sender: UnboundedSender<NotificationPayload>) -> Self {
        Self { sender }
    }
}

impl DeepLinkHandler for ChannelHandler {
    fn handle(&self, payload: NotificationPayload) {
        if self.sender.send(payload).is_err() {
            warn!("Deep link receiver dropped, payload discarded");
        }
    }
}

/// 注册凭证，用于 [`DeepLinkDispatcher::unregister_handler_if`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// 分发器状态（仅用于观察，不暴露 payload 本身）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Buffered,
    Ready,
    /// 有 handler 时缓冲总会被立即清空，正常不可达
    ReadyWithBuffered,
}

struct Registered {
    id: HandlerId,
    handler: Arc<dyn DeepLinkHandler>,
}

#[derive(Default)]
struct Inner {
    handler: Option<Registered>,
    pending: PendingPayloadBuffer,
    next_id: u64,
}

/// Deep-link 分发器
#[derive(Default)]
pub struct DeepLinkDispatcher {
    inner: Mutex<Inner>,
}

impl DeepLinkDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新 payload 到达
    pub fn on_payload_arrived(&self, payload: NotificationPayload) {
        let mut inner = self.lock();

        if let Some(registered) = &inner.handler {
            debug!(
                kind = %payload.kind(),
                handler = registered.id.0,
                "Delivering deep link to active handler"
            );
            registered.handler.handle(payload);
            return;
        }

        let kind = payload.kind().to_string();
        if let Some(superseded) = inner.pending.replace(payload) {
            info!(
                superseded_kind = %superseded.kind(),
                kind = %kind,
                "Pending deep link superseded by newer payload"
            );
        } else {
            debug!(kind = %kind, "No handler registered, buffering deep link");
        }
    }

    /// 注册 handler（替换旧的），有缓冲 payload 时立即投递
    pub fn register_handler(&self, handler: Arc<dyn DeepLinkHandler>) -> HandlerId {
        let mut inner = self.lock();

        inner.next_id += 1;
        let id = HandlerId(inner.next_id);
        if let Some(previous) = inner.handler.replace(Registered { id, handler }) {
            debug!(previous = previous.id.0, handler = id.0, "Replacing deep link handler");
        }

        let Inner { handler, pending, .. } = &mut *inner;
        if let (Some(registered), Some(payload)) = (handler.as_ref(), pending.take()) {
            info!(kind = %payload.kind(), handler = id.0, "Flushing buffered deep link");
            registered.handler.handle(payload);
        }

        id
    }

    /// 注销当前 handler，缓冲不变
    pub fn unregister_handler(&self) {
        if let Some(previous) = self.lock().handler.take() {
            debug!(handler = previous.id.0, "Deep link handler unregistered");
        }
    }

    /// 仅当当前 handler 仍是 `id` 时注销
    ///
    /// 页面销毁晚于新页面注册时，不会把新页面的 handler 清掉。
    pub fn unregister_handler_if(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        match &inner.handler {
            Some(registered) if registered.id == id => {
                inner.handler = None;
                debug!(handler = id.0, "Deep link handler unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> DispatcherState {
        let inner = self.lock();
        match (inner.handler.is_some(), !inner.pending.is_empty()) {
            (false, false) => DispatcherState::Idle,
            (false, true) => DispatcherState::Buffered,
            (true, false) => DispatcherState::Ready,
            (true, true) => DispatcherState::ReadyWithBuffered,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // handler panic 时锁会中毒，但 Inner 在每条语句之间都是一致的
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
