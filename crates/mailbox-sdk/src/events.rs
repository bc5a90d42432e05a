//! 本地数据变更广播 - 存储层写事务提交后通知所有观察者
//!
//! 观察流（observe_*）订阅此广播，收到涉及自己关心的表的变更后重新查询。

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::debug;

use crate::model::UserId;

/// 持久化表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Conversation,
    ConversationLabel,
    Message,
    MessageLabel,
    UnreadMessagesCount,
    UnreadConversationsCount,
    PageInterval,
    Outbox,
}

impl Table {
    pub const CONVERSATIONS: &'static [Table] = &[Table::Conversation, Table::ConversationLabel];
    pub const MESSAGES: &'static [Table] = &[Table::Message, Table::MessageLabel];
    pub const UNREAD_COUNTS: &'static [Table] =
        &[Table::UnreadMessagesCount, Table::UnreadConversationsCount];
    pub const ALL: &'static [Table] = &[
        Table::Conversation,
        Table::ConversationLabel,
        Table::Message,
        Table::MessageLabel,
        Table::UnreadMessagesCount,
        Table::UnreadConversationsCount,
        Table::PageInterval,
        Table::Outbox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Conversation => "conversation",
            Table::ConversationLabel => "conversation_label",
            Table::Message => "message",
            Table::MessageLabel => "message_label",
            Table::UnreadMessagesCount => "unread_messages_count",
            Table::UnreadConversationsCount => "unread_conversations_count",
            Table::PageInterval => "page_interval",
            Table::Outbox => "outbox",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次已提交写事务涉及的表
#[derive(Debug, Clone)]
pub struct TablesChanged {
    pub user_id: UserId,
    pub tables: Vec<Table>,
    pub timestamp: u64,
}

impl TablesChanged {
    pub fn touches(&self, user_id: &UserId, tables: &[Table]) -> bool {
        &self.user_id == user_id && self.tables.iter().any(|t| tables.contains(t))
    }
}

/// 变更广播器
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<TablesChanged>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 广播变更（无订阅者时 send 失败属正常场景，仅打 debug）
    pub fn emit(&self, user_id: &UserId, tables: &[Table]) {
        if tables.is_empty() {
            return;
        }
        let event = TablesChanged {
            user_id: user_id.clone(),
            tables: tables.to_vec(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        };
        if let Err(e) = self.sender.send(event) {
            debug!("变更广播无订阅者: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TablesChanged> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let notifier = ChangeNotifier::new(8);
        let mut rx = notifier.subscribe();
        let user = UserId::from("u1");

        notifier.emit(&user, Table::CONVERSATIONS);

        let event = rx.recv().await.unwrap();
        assert!(event.touches(&user, &[Table::ConversationLabel]));
        assert!(!event.touches(&user, &[Table::Message]));
        assert!(!event.touches(&UserId::from("u2"), &[Table::Conversation]));
        println!("✅ 变更广播测试通过");
    }
}
