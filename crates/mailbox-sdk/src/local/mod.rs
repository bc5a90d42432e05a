//! 本地数据源：在 StorageManager 之上提供面向领域的读写与观察接口

pub mod conversation;
pub mod message;
pub mod outbox;
pub mod unread;

pub use conversation::{ConversationLocalDataSource, SqliteConversationLocalDataSource};
pub use message::{MessageLocalDataSource, SqliteMessageLocalDataSource};
pub use outbox::{OutboxLocalDataSource, SqliteOutboxLocalDataSource};
pub use unread::{SqliteUnreadCountLocalDataSource, UnreadCountLocalDataSource};
