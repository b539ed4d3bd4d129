//! 待投递 payload 缓冲 - 单槽，新到达的覆盖旧的

use super::payload::NotificationPayload;

/// 单槽缓冲
///
/// 同一时刻只可能有一次前台导航，因此只保留最近一条。
#[derive(Debug, Default)]
pub struct PendingPayloadBuffer {
    slot: Option<NotificationPayload>,
}

impl PendingPayloadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入 payload，返回被覆盖的旧 payload
    pub fn replace(&mut self, payload: NotificationPayload) -> Option<NotificationPayload> {
        self.slot.replace(payload)
    }

    /// 取出并清空
    pub fn take(&mut self) -> Option<NotificationPayload> {
        self.slot.take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
