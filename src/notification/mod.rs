//! 通知层 - payload 解析、展示内容与 deep-link 分发
//!
//! # 使用示例
//! ```ignore
//! use push_ingest::notification::{payload, DeepLinkDispatcher};
//!
//! let dispatcher = DeepLinkDispatcher::new();
//! if let Some(p) = payload::parse_json(r#"{"type":"formation","id":"42"}"#) {
//!     dispatcher.on_payload_arrived(p);
//! }
//! dispatcher.register_handler(std::sync::Arc::new(|p| println!("{:?}", p)));
//! ```

pub mod buffer;
pub mod content;
pub mod dispatcher;
pub mod payload;
pub mod route;

pub use buffer::PendingPayloadBuffer;
pub use content::{MediaAttachment, NotificationContent};
pub use dispatcher::{ChannelHandler, DeepLinkDispatcher, DeepLinkHandler, DispatcherState, HandlerId};
pub use payload::{NotificationPayload, PayloadKind, TargetId};
pub use route::route_for;
