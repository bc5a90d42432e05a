//! 消息事件监听器

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::envelope::{decode_change, EntityChange, EventEnvelope, EventItem};
use super::listener::EventListener;
use crate::error::Result;
use crate::events::Table;
use crate::local::{MessageLocalDataSource, OutboxLocalDataSource};
use crate::model::{MessageId, SystemLabelId, UserId};
use crate::paging::PageKey;
use crate::remote::MessageRemoteDataSource;
use crate::storage::dao::MessageDao;

pub struct MessageEventListener {
    local: Arc<dyn MessageLocalDataSource>,
    outbox: Arc<dyn OutboxLocalDataSource>,
    remote: Arc<dyn MessageRemoteDataSource>,
}

impl MessageEventListener {
    pub fn new(
        local: Arc<dyn MessageLocalDataSource>,
        outbox: Arc<dyn OutboxLocalDataSource>,
        remote: Arc<dyn MessageRemoteDataSource>,
    ) -> Self {
        Self { local, outbox, remote }
    }
}

#[async_trait]
impl EventListener for MessageEventListener {
    fn name(&self) -> &'static str {
        "message"
    }

    fn order(&self) -> u32 {
        1
    }

    fn tables(&self) -> &'static [Table] {
        Table::MESSAGES
    }

    fn deserialize(&self, envelope: &EventEnvelope) -> Option<Vec<EventItem>> {
        let events = envelope.messages.as_ref()?;
        let items: Vec<EventItem> = events
            .iter()
            .filter_map(|event| {
                decode_change(&event.id, event.action, event.message.as_ref()).map(|change| EventItem::Message {
                    id: MessageId::new(event.id.clone()),
                    change,
                })
            })
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn apply(&self, conn: &Connection, user_id: &UserId, items: &[EventItem]) -> Result<()> {
        let dao = MessageDao::new(conn);
        for item in items {
            let EventItem::Message { id, change } = item else {
                continue;
            };
            match change {
                EntityChange::Delete => {
                    dao.delete(user_id, std::slice::from_ref(id))?;
                }
                EntityChange::Create(resource) | EntityChange::Update(resource) => {
                    dao.upsert(&resource.to_message(user_id))?;
                }
                EntityChange::Partial { patch, full } => match dao.get(user_id, id)? {
                    Some(stored) => dao.upsert(&patch.apply_to(stored))?,
                    None => match full {
                        Some(resource) => dao.upsert(&resource.to_message(user_id))?,
                        None => warn!("⚠️ 局部更新的消息不在本地且载荷不完整，跳过: {}", id),
                    },
                },
            }
        }
        debug!("消息事件已应用: user={}, count={}", user_id, items.len());
        Ok(())
    }

    async fn reset_all(&self, user_id: &UserId) -> Result<()> {
        let keep = self.outbox.all_ids(user_id).await?;
        self.local.delete_all_messages_except(user_id, &keep).await?;
        info!("🔄 消息缓存已重置: user={}, 保留发件箱 {} 条", user_id, keep.len());

        let page_key = PageKey::for_label(SystemLabelId::Inbox);
        match self.remote.get_messages(user_id, &page_key).await {
            Ok(messages) => self.local.upsert_messages(user_id, &page_key, messages).await?,
            Err(e) => warn!("⚠️ 重置后拉取收件箱消息失败: user={}, error={}", user_id, e),
        }
        Ok(())
    }
}
