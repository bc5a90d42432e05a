//! 未读计数事件监听器：计数总是整条替换

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{info, warn};

use super::envelope::{EventEnvelope, EventItem};
use super::listener::EventListener;
use crate::error::Result;
use crate::events::Table;
use crate::local::unread::save_counters_tx;
use crate::local::UnreadCountLocalDataSource;
use crate::model::{CounterKind, UnreadCount, UserId};
use crate::remote::UnreadCountRemoteDataSource;

pub struct UnreadCountEventListener {
    local: Arc<dyn UnreadCountLocalDataSource>,
    remote: Arc<dyn UnreadCountRemoteDataSource>,
}

impl UnreadCountEventListener {
    pub fn new(local: Arc<dyn UnreadCountLocalDataSource>, remote: Arc<dyn UnreadCountRemoteDataSource>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl EventListener for UnreadCountEventListener {
    fn name(&self) -> &'static str {
        "unread_count"
    }

    fn order(&self) -> u32 {
        1
    }

    fn tables(&self) -> &'static [Table] {
        Table::UNREAD_COUNTS
    }

    fn deserialize(&self, envelope: &EventEnvelope) -> Option<Vec<EventItem>> {
        let messages = envelope
            .message_counts
            .iter()
            .flatten()
            .map(|c| EventItem::MessageCount(UnreadCount::from(c)));
        let conversations = envelope
            .conversation_counts
            .iter()
            .flatten()
            .map(|c| EventItem::ConversationCount(UnreadCount::from(c)));
        let items: Vec<EventItem> = messages.chain(conversations).collect();
        (!items.is_empty()).then_some(items)
    }

    fn apply(&self, conn: &Connection, user_id: &UserId, items: &[EventItem]) -> Result<()> {
        let mut messages = Vec::new();
        let mut conversations = Vec::new();
        for item in items {
            match item {
                EventItem::MessageCount(count) => messages.push(count.clone()),
                EventItem::ConversationCount(count) => conversations.push(count.clone()),
                _ => {}
            }
        }
        save_counters_tx(conn, user_id, CounterKind::Messages, &messages)?;
        save_counters_tx(conn, user_id, CounterKind::Conversations, &conversations)?;
        Ok(())
    }

    async fn reset_all(&self, user_id: &UserId) -> Result<()> {
        self.local.delete_all(user_id).await?;
        info!("🔄 未读计数已清空: user={}", user_id);

        match self.remote.get_message_counters(user_id).await {
            Ok(counters) => self.local.save_message_counters(user_id, counters).await?,
            Err(e) => warn!("⚠️ 重置后拉取消息计数失败: user={}, error={}", user_id, e),
        }
        match self.remote.get_conversation_counters(user_id).await {
            Ok(counters) => self.local.save_conversation_counters(user_id, counters).await?,
            Err(e) => warn!("⚠️ 重置后拉取会话计数失败: user={}, error={}", user_id, e),
        }
        Ok(())
    }
}
