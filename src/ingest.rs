//! 主应用入口 - 解析通知并交给 deep-link 分发器

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::notification::dispatcher::DeepLinkDispatcher;
use crate::notification::payload;
use crate::notification::route::route_for;

/// 通知摄入管线
pub struct IngestPipeline {
    dispatcher: Arc<DeepLinkDispatcher>,
}

impl IngestPipeline {
    pub fn new(dispatcher: Arc<DeepLinkDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<DeepLinkDispatcher> {
        &self.dispatcher
    }

    /// 处理一条原始通知；返回是否产生了 deep link
    ///
    /// 无法解析的通知只是没有 deep link，展示不受影响。
    pub fn on_notification(&self, raw: &Map<String, Value>) -> bool {
        let Some(payload) = payload::parse(raw) else {
            debug!("Notification carries no deep link");
            return false;
        };

        info!(
            kind = %payload.kind(),
            target = ?payload.target().map(|t| t.to_string()),
            route = ?route_for(&payload),
            "Deep link received"
        );
        self.dispatcher.on_payload_arrived(payload);
        true
    }

    /// JSON 字符串形式的 [`Self::on_notification`]
    pub fn on_notification_json(&self, json: &str) -> bool {
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(raw)) => self.on_notification(&raw),
            _ => {
                debug!("Notification is not a JSON object");
                false
            }
        }
    }
}
