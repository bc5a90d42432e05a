//! 仓库层：组合本地与远端数据源，对外提供读取、观察与变更接口

pub mod conversation;
pub mod message;
pub mod store;
pub mod unread;

pub use conversation::ConversationRepository;
pub use message::MessageRepository;
pub use store::SingleFlight;
pub use unread::UnreadCountRepository;
