//! Deep-link 路由 - payload 到应用内路径的映射

use super::payload::{NotificationPayload, PayloadKind};

/// 应用内导航路径，generic 类型没有固定页面时返回 `None`
pub fn route_for(payload: &NotificationPayload) -> Option<String> {
    let target = payload.target();
    match (payload.kind(), target) {
        (PayloadKind::Formation, Some(t)) => Some(format!("/formations/{}", t)),
        (PayloadKind::Event, Some(t)) => Some(format!("/events/{}", t)),
        (PayloadKind::Promotion, Some(t)) => Some(format!("/promotions/{}", t)),
        (PayloadKind::Promotion, None) => Some("/promotions".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::payload::parse_json;

    #[test]
    fn test_routes() {
        let route = |json: &str| route_for(&parse_json(json).unwrap());

        assert_eq!(route(r#"{"type":"formation","slug":"rust-101"}"#).as_deref(), Some("/formations/rust-101"));
        assert_eq!(route(r#"{"type":"event","id":7}"#).as_deref(), Some("/events/7"));
        assert_eq!(route(r#"{"type":"promotion"}"#).as_deref(), Some("/promotions"));
        assert_eq!(route(r#"{"type":"promotion","id":"spring"}"#).as_deref(), Some("/promotions/spring"));
        assert_eq!(route(r#"{"type":"survey","id":"1"}"#), None);
    }
}
