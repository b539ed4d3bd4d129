//! Payload 解析模块 - 把推送的原始字典转换为结构化 `NotificationPayload`
//!
//! 原始 payload 格式（APNs 风格，自定义字段在顶层或 `data` 下）：
//! ```json
//! {
//!   "aps": { "alert": { "title": "...", "body": "..." }, "mutable-content": 1 },
//!   "type": "formation",
//!   "id": "42",
//!   "image_url": "https://cdn.example.com/a.png",
//!   "campaign": "spring"
//! }
//! ```
//!
//! 解析规则：
//! - 没有 `type`（或为空）时返回 `None`，不抛错
//! - `formation` / `event` 必须带目标（`<type>_id`、`id` 或 `slug`），否则返回 `None`
//! - 未知类型保留为 `PayloadKind::Generic`，其余字段进入 metadata

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// 类型字段
const TYPE_KEY: &str = "type";

/// 通用目标字段（按优先级，`<type>_id` 排在最前）
const TARGET_KEYS: [&str; 2] = ["id", "slug"];

/// 附件地址字段（按优先级）
const ATTACHMENT_KEYS: [&str; 4] = ["image_url", "attachment_url", "media_url", "image"];

/// 系统保留字段，不进入 metadata
const APS_KEY: &str = "aps";

/// FCM 风格的嵌套数据字段
const DATA_KEY: &str = "data";

/// Payload 类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Formation,
    Event,
    Promotion,
    /// 未识别的类型，保留原始类型名
    Generic(String),
}

impl PayloadKind {
    /// 从 `type` 字段映射（大小写不敏感）
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "formation" => PayloadKind::Formation,
            "event" => PayloadKind::Event,
            "promotion" => PayloadKind::Promotion,
            _ => PayloadKind::Generic(name.to_string()),
        }
    }

    /// 该类型是否必须带目标才能导航
    pub fn requires_target(&self) -> bool {
        matches!(self, PayloadKind::Formation | PayloadKind::Event)
    }

    pub fn as_str(&self) -> &str {
        match self {
            PayloadKind::Formation => "formation",
            PayloadKind::Event => "event",
            PayloadKind::Promotion => "promotion",
            PayloadKind::Generic(name) => name,
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 导航目标：字符串 slug 或数字 id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TargetId {
    Numeric(u64),
    Slug(String),
}

impl TargetId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(TargetId::Slug(s.to_string()))
                }
            }
            Value::Number(n) => n.as_u64().map(TargetId::Numeric),
            _ => None,
        }
    }

    /// 数字形式（字符串 "42" 也视为 42）
    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            TargetId::Numeric(n) => Some(*n),
            TargetId::Slug(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Numeric(n) => write!(f, "{}", n),
            TargetId::Slug(s) => f.write_str(s),
        }
    }
}

/// 结构化通知 payload
///
/// 只能通过 [`parse`] 构造，创建后不可变。
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    kind: PayloadKind,
    target: Option<TargetId>,
    metadata: BTreeMap<String, String>,
    raw: Map<String, Value>,
    received_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn kind(&self) -> &PayloadKind {
        &self.kind
    }

    pub fn target(&self) -> Option<&TargetId> {
        self.target.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// 原始 payload（诊断用）
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// 解析原始 payload
///
/// 对任何缺少必要字段的输入返回 `None`，从不 panic。
pub fn parse(raw: &Map<String, Value>) -> Option<NotificationPayload> {
    let fields = custom_fields(raw);

    let type_name = match fields.get(TYPE_KEY).and_then(Value::as_str).map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => {
            debug!("Notification payload has no type, skipping deep link");
            return None;
        }
    };
    let kind = PayloadKind::from_type_name(type_name);

    let kind_key = format!("{}_id", type_name.to_ascii_lowercase());
    let target_entry = std::iter::once(kind_key.as_str())
        .chain(TARGET_KEYS)
        .find_map(|key| {
            fields
                .get(key)
                .and_then(TargetId::from_value)
                .map(|target| (key.to_string(), target))
        });

    if kind.requires_target() && target_entry.is_none() {
        debug!(kind = %kind, "Notification payload has no target, skipping deep link");
        return None;
    }

    let target_key = target_entry.as_ref().map(|(key, _)| key.as_str());
    let metadata = fields
        .iter()
        .filter(|(key, _)| {
            let key = key.as_str();
            key != TYPE_KEY
                && key != APS_KEY
                && Some(key) != target_key
                && !ATTACHMENT_KEYS.contains(&key)
        })
        .filter_map(|(key, value)| metadata_value(value).map(|v| (key.clone(), v)))
        .collect();

    Some(NotificationPayload {
        kind,
        target: target_entry.map(|(_, target)| target),
        metadata,
        raw: raw.clone(),
        received_at: Utc::now(),
    })
}

/// 解析 JSON 字符串，非对象返回 `None`
pub fn parse_json(json: &str) -> Option<NotificationPayload> {
    let value: Value = serde_json::from_str(json).ok()?;
    parse(value.as_object()?)
}

/// 提取附件地址（仅供附件下载任务使用）
///
/// 查找顺序与 `type` 在哪一层无关：顶层、`data`、`fcm_options.image`。
pub fn attachment_source(raw: &Map<String, Value>) -> Option<String> {
    let data = raw.get(DATA_KEY).and_then(Value::as_object);

    std::iter::once(raw)
        .chain(data)
        .find_map(|fields| {
            ATTACHMENT_KEYS
                .iter()
                .find_map(|key| fields.get(*key).and_then(non_empty_str))
        })
        // FCM: { "fcm_options": { "image": "..." } }
        .or_else(|| {
            std::iter::once(raw)
                .chain(data)
                .find_map(|fields| fields.get("fcm_options").and_then(|o| o.get("image")).and_then(non_empty_str))
        })
        .map(str::to_string)
}

/// 自定义字段所在的字典：顶层没有 `type` 而 `data` 下有时，取 `data`
fn custom_fields(raw: &Map<String, Value>) -> &Map<String, Value> {
    if raw.contains_key(TYPE_KEY) {
        return raw;
    }
    match raw.get(DATA_KEY).and_then(Value::as_object) {
        Some(data) if data.contains_key(TYPE_KEY) => data,
        _ => raw,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn metadata_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_formation_with_id() {
        let payload = parse(&map(json!({"type": "formation", "id": "42"}))).unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Formation);
        assert_eq!(payload.target(), Some(&TargetId::Slug("42".to_string())));
        assert_eq!(payload.target().unwrap().as_numeric(), Some(42));
        assert!(payload.metadata().is_empty());
    }

    #[test]
    fn test_parse_numeric_event_id() {
        let payload = parse(&map(json!({"type": "event", "id": 7}))).unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Event);
        assert_eq!(payload.target(), Some(&TargetId::Numeric(7)));
    }

    #[test]
    fn test_kind_specific_key_wins() {
        let payload = parse(&map(json!({
            "type": "formation",
            "formation_id": "rust-101",
            "id": "99"
        })))
        .unwrap();
        assert_eq!(payload.target(), Some(&TargetId::Slug("rust-101".to_string())));
        // 未使用的 id 保留在 metadata
        assert_eq!(payload.metadata().get("id"), Some(&"99".to_string()));
    }

    #[test]
    fn test_slug_fallback() {
        let payload = parse(&map(json!({"type": "Formation", "slug": "intro"}))).unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Formation);
        assert_eq!(payload.target(), Some(&TargetId::Slug("intro".to_string())));
    }

    #[test]
    fn test_missing_type_is_absent() {
        assert!(parse(&map(json!({"id": "42"}))).is_none());
        assert!(parse(&map(json!({"type": "", "id": "42"}))).is_none());
        assert!(parse(&map(json!({"type": "   "}))).is_none());
        assert!(parse(&map(json!({"type": 3, "id": "42"}))).is_none());
        assert!(parse(&Map::new()).is_none());
    }

    #[test]
    fn test_navigable_kind_without_target_is_absent() {
        assert!(parse(&map(json!({"type": "formation"}))).is_none());
        assert!(parse(&map(json!({"type": "event", "id": ""}))).is_none());
        assert!(parse(&map(json!({"type": "event", "id": -3}))).is_none());
        assert!(parse(&map(json!({"type": "event", "id": null}))).is_none());
    }

    #[test]
    fn test_promotion_without_target() {
        let payload = parse(&map(json!({"type": "promotion", "code": "SPRING"}))).unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Promotion);
        assert!(payload.target().is_none());
        assert_eq!(payload.metadata().get("code"), Some(&"SPRING".to_string()));
    }

    #[test]
    fn test_unknown_type_is_generic() {
        let payload = parse(&map(json!({
            "type": "survey",
            "question": "how was it?",
            "count": 3,
            "flags": ["a", "b"]
        })))
        .unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Generic("survey".to_string()));
        assert_eq!(payload.kind().to_string(), "survey");
        assert_eq!(payload.metadata().get("count"), Some(&"3".to_string()));
        assert_eq!(payload.metadata().get("flags"), Some(&r#"["a","b"]"#.to_string()));
    }

    #[test]
    fn test_reserved_keys_excluded_from_metadata() {
        let payload = parse(&map(json!({
            "aps": {"alert": "hi"},
            "type": "event",
            "id": 1,
            "image_url": "https://cdn/x.png",
            "campaign": "spring",
            "empty": null
        })))
        .unwrap();
        let keys: Vec<&String> = payload.metadata().keys().collect();
        assert_eq!(keys, vec!["campaign"]);
        // 原始 payload 完整保留
        assert!(payload.raw().contains_key("aps"));
        assert!(payload.raw().contains_key("image_url"));
    }

    #[test]
    fn test_nested_data_fields() {
        let payload = parse(&map(json!({
            "aps": {"alert": "hi"},
            "data": {"type": "formation", "id": "12"}
        })))
        .unwrap();
        assert_eq!(payload.kind(), &PayloadKind::Formation);
        assert_eq!(payload.target().unwrap().to_string(), "12");
    }

    #[test]
    fn test_parse_json() {
        assert!(parse_json(r#"{"type":"event","id":5}"#).is_some());
        assert!(parse_json("not json").is_none());
        assert!(parse_json("[1,2]").is_none());
        assert!(parse_json("null").is_none());
    }

    #[test]
    fn test_attachment_source_priority() {
        let raw = map(json!({
            "image": "https://cdn/b.jpg",
            "image_url": "https://cdn/a.png"
        }));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn test_attachment_source_fcm_options() {
        let raw = map(json!({"fcm_options": {"image": "https://cdn/c.webp"}}));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn/c.webp"));
    }

    #[test]
    fn test_attachment_source_top_level_with_nested_type() {
        let raw = map(json!({
            "aps": {"alert": "hi", "mutable-content": 1},
            "image_url": "https://cdn.example.com/a.png",
            "data": {"type": "formation", "id": "1"}
        }));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn.example.com/a.png"));
        assert_eq!(parse(&raw).unwrap().kind(), &PayloadKind::Formation);
    }

    #[test]
    fn test_attachment_source_nested_with_top_level_type() {
        let raw = map(json!({
            "type": "event",
            "id": 3,
            "data": {"image_url": "https://cdn.example.com/b.gif"}
        }));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn.example.com/b.gif"));
    }

    #[test]
    fn test_attachment_source_top_level_beats_data() {
        let raw = map(json!({
            "media_url": "https://cdn/top.jpg",
            "data": {"type": "event", "id": 1, "image_url": "https://cdn/nested.jpg"}
        }));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn/top.jpg"));
    }

    #[test]
    fn test_attachment_source_nested_fcm_options() {
        let raw = map(json!({"data": {"type": "event", "id": 1, "fcm_options": {"image": "https://cdn/d.png"}}}));
        assert_eq!(attachment_source(&raw).as_deref(), Some("https://cdn/d.png"));
    }

    #[test]
    fn test_attachment_source_absent() {
        assert!(attachment_source(&map(json!({"type": "event", "id": 1}))).is_none());
        assert!(attachment_source(&map(json!({"image_url": "  "}))).is_none());
        assert!(attachment_source(&map(json!({"image_url": 12}))).is_none());
    }
}
