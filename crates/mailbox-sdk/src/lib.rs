//! Mailbox SDK - 离线优先的邮箱会话 / 消息缓存
//!
//! 本 SDK 提供：
//! - 📦 每用户 SQLite 缓存：会话、消息、未读计数、分页区间
//! - 📄 分页状态机：本地页有效性判断、区间合并、UI 加载状态映射
//! - 🔄 增量同步：服务端事件游标 + 按表监听器原子应用
//! - 🏷️ 标签 / 已读变更：本地乐观更新，远端任务持久化排队并带退避重试
//! - 🔗 分享信息编解码
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use mailbox_sdk::{MailboxConfig, MailboxSdk, PageKey, Session, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MailboxConfig::builder()
//!         .data_dir("/path/to/data")
//!         .api_base_url("https://mail.proton.me/api")
//!         .build()?;
//!     let sdk = MailboxSdk::new(config).await?;
//!
//!     let user = UserId::from("user123");
//!     sdk.login(&user, Session { session_uid: "uid".into(), access_token: "token".into() }).await?;
//!
//!     let page = sdk.conversations().get_conversations(&user, &PageKey::default()).await?;
//!     println!("会话数: {}", page.len());
//!
//!     sdk.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod events;
pub mod local;
pub mod logging;
pub mod model;
pub mod paging;
pub mod remote;
pub mod repository;
pub mod sdk;
pub mod share_info;
pub mod storage;
pub mod sync;
pub mod version;

// 重新导出核心类型，方便使用
pub use error::{DataError, DataResult, LocalError, MailboxSdkError, NetworkError, ProtonError, RemoteError, Result};
pub use events::{ChangeNotifier, Table, TablesChanged};
pub use logging::{init_logging, LoggingConfig};
pub use model::{
    Conversation, ConversationId, ConversationLabel, ConversationWithContext, ConversationWithMessages, CounterKind,
    LabelId, Message, MessageId, Recipient, SystemLabelId, UnreadCount, UnreadCounter, UserId,
};
pub use paging::{
    CombinedLoadStates, LoadState, LoadStates, MailboxListState, PageFilter, PageKey, PagingError, PagingSnapshot,
    ReadStatus, SearchMode,
};
pub use remote::{HttpClientConfig, Session};
pub use repository::{ConversationRepository, MessageRepository, UnreadCountRepository};
pub use sdk::{EventConfig, MailboxConfig, MailboxConfigBuilder, MailboxSdk, QueueConfig};
pub use share_info::IntentShareInfo;
pub use storage::queue::RetryPolicy;
pub use storage::StorageManager;
pub use sync::{EventEnvelope, EventListener, EventManager};
pub use version::{version_string, SDK_VERSION};
