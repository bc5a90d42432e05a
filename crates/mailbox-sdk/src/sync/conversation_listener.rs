//! 会话事件监听器

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::envelope::{decode_change, EntityChange, EventEnvelope, EventItem};
use super::listener::EventListener;
use crate::error::Result;
use crate::events::Table;
use crate::local::{ConversationLocalDataSource, MessageLocalDataSource, OutboxLocalDataSource};
use crate::model::{ConversationId, SystemLabelId, UserId};
use crate::paging::PageKey;
use crate::remote::ConversationRemoteDataSource;
use crate::storage::dao::ConversationDao;

pub struct ConversationEventListener {
    local: Arc<dyn ConversationLocalDataSource>,
    messages: Arc<dyn MessageLocalDataSource>,
    outbox: Arc<dyn OutboxLocalDataSource>,
    remote: Arc<dyn ConversationRemoteDataSource>,
}

impl ConversationEventListener {
    pub fn new(
        local: Arc<dyn ConversationLocalDataSource>,
        messages: Arc<dyn MessageLocalDataSource>,
        outbox: Arc<dyn OutboxLocalDataSource>,
        remote: Arc<dyn ConversationRemoteDataSource>,
    ) -> Self {
        Self {
            local,
            messages,
            outbox,
            remote,
        }
    }

    /// 发件箱消息所在的会话
    async fn outbox_conversations(&self, user_id: &UserId) -> Result<Vec<ConversationId>> {
        let outbox_ids = self.outbox.all_ids(user_id).await?;
        if outbox_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<ConversationId> = self
            .messages
            .get_messages_by_ids(user_id, &outbox_ids)
            .await?
            .into_iter()
            .map(|m| m.conversation_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl EventListener for ConversationEventListener {
    fn name(&self) -> &'static str {
        "conversation"
    }

    fn order(&self) -> u32 {
        2
    }

    fn tables(&self) -> &'static [Table] {
        Table::CONVERSATIONS
    }

    fn deserialize(&self, envelope: &EventEnvelope) -> Option<Vec<EventItem>> {
        let events = envelope.conversations.as_ref()?;
        let items: Vec<EventItem> = events
            .iter()
            .filter_map(|event| {
                decode_change(&event.id, event.action, event.conversation.as_ref()).map(|change| {
                    EventItem::Conversation {
                        id: ConversationId::new(event.id.clone()),
                        change,
                    }
                })
            })
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn apply(&self, conn: &Connection, user_id: &UserId, items: &[EventItem]) -> Result<()> {
        let dao = ConversationDao::new(conn);
        for item in items {
            let EventItem::Conversation { id, change } = item else {
                continue;
            };
            match change {
                EntityChange::Delete => {
                    dao.delete(user_id, std::slice::from_ref(id))?;
                }
                EntityChange::Create(resource) | EntityChange::Update(resource) => {
                    dao.upsert(&resource.to_conversation(user_id))?;
                }
                EntityChange::Partial { patch, full } => match dao.get(user_id, id)? {
                    Some(stored) => dao.upsert(&patch.apply_to(stored))?,
                    None => match full {
                        Some(resource) => dao.upsert(&resource.to_conversation(user_id))?,
                        None => warn!("⚠️ 局部更新的会话不在本地且载荷不完整，跳过: {}", id),
                    },
                },
            }
        }
        debug!("会话事件已应用: user={}, count={}", user_id, items.len());
        Ok(())
    }

    async fn reset_all(&self, user_id: &UserId) -> Result<()> {
        let keep = self.outbox_conversations(user_id).await?;
        self.local.delete_all_conversations_except(user_id, &keep).await?;
        info!("🔄 会话缓存已重置: user={}, 保留 {} 个发件箱会话", user_id, keep.len());

        let page_key = PageKey::for_label(SystemLabelId::Inbox);
        match self.remote.get_conversations(user_id, &page_key).await {
            Ok(conversations) => self.local.upsert_conversations(user_id, &page_key, conversations).await?,
            Err(e) => warn!("⚠️ 重置后拉取收件箱会话失败: user={}, error={}", user_id, e),
        }
        Ok(())
    }
}
