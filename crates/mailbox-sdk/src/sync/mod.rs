//! 增量同步模块
//!
//! 职责：
//! - 拉取服务端事件批次（`EventRemoteDataSource`）
//! - 按监听器顺序在单个写事务内应用
//! - 维护每个用户的事件游标
//! - 服务端要求刷新时重置本地缓存（保留发件箱）

pub mod action;
pub mod conversation_listener;
pub mod cursor_store;
pub mod envelope;
pub mod event_manager;
pub mod listener;
pub mod message_listener;
pub mod unread_listener;

pub use action::EventAction;
pub use conversation_listener::ConversationEventListener;
pub use cursor_store::EventCursorStore;
pub use envelope::{
    ConversationEvent, ConversationPatch, EntityChange, EventEnvelope, EventItem, MessageEvent, MessagePatch,
};
pub use event_manager::EventManager;
pub use listener::EventListener;
pub use message_listener::MessageEventListener;
pub use unread_listener::UnreadCountEventListener;
