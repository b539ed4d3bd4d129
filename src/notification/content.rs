//! 通知展示内容 - 从 `aps` 字典构建，可附加一个本地媒体附件

use serde::Serialize;
use serde_json::{Map, Value};

use crate::attachment::cache::CacheEntry;

/// 媒体附件（指向本地缓存文件）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaAttachment {
    /// 附件标识（缓存条目 id）
    pub identifier: String,
    /// 本地文件路径
    pub file: std::path::PathBuf,
    /// 文件扩展名，渲染端据此推断类型
    pub type_hint: String,
}

impl From<CacheEntry> for MediaAttachment {
    fn from(entry: CacheEntry) -> Self {
        Self {
            identifier: entry.id().to_string(),
            type_hint: entry.extension().to_string(),
            file: entry.into_path(),
        }
    }
}

/// 待展示的通知内容
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationContent {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub badge: Option<u32>,
    pub sound: Option<String>,
    pub category: Option<String>,
    pub thread_id: Option<String>,
    /// 除 `aps` 外的自定义字段
    pub user_info: Map<String, Value>,
    pub attachments: Vec<MediaAttachment>,
}

impl NotificationContent {
    /// 从原始 payload 构建
    ///
    /// `aps.alert` 可以是字符串（作为 body）或 `{title, subtitle, body}` 字典。
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let aps = raw.get("aps").and_then(Value::as_object);
        let alert = aps.and_then(|a| a.get("alert"));

        let (title, subtitle, body) = match alert {
            Some(Value::String(body)) => (None, None, Some(body.clone())),
            Some(Value::Object(alert)) => (
                string_field(alert, "title"),
                string_field(alert, "subtitle"),
                string_field(alert, "body"),
            ),
            _ => (None, None, None),
        };

        let user_info = raw
            .iter()
            .filter(|(key, _)| key.as_str() != "aps")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            title,
            subtitle,
            body,
            badge: aps
                .and_then(|a| a.get("badge"))
                .and_then(Value::as_u64)
                .and_then(|b| u32::try_from(b).ok()),
            sound: aps.and_then(|a| string_field(a, "sound")),
            category: aps.and_then(|a| string_field(a, "category")),
            thread_id: aps.and_then(|a| string_field(a, "thread-id")),
            user_info,
            attachments: Vec::new(),
        }
    }

    /// 附加缓存文件
    pub fn with_attachment(mut self, entry: CacheEntry) -> Self {
        self.attachments.push(entry.into());
        self
    }

    pub fn has_attachment(&self) -> bool {
        !self.attachments.is_empty()
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}
