//! 发件箱本地数据源 - 重置缓存时受保护的消息 ID

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::Table;
use crate::model::{MessageId, UserId};
use crate::storage::dao::OutboxDao;
use crate::storage::queue::now_ms;
use crate::storage::StorageManager;

#[async_trait]
pub trait OutboxLocalDataSource: Send + Sync {
    async fn add(&self, user_id: &UserId, message_id: &MessageId) -> Result<()>;
    async fn remove(&self, user_id: &UserId, message_id: &MessageId) -> Result<()>;
    async fn all_ids(&self, user_id: &UserId) -> Result<Vec<MessageId>>;
}

pub struct SqliteOutboxLocalDataSource {
    storage: Arc<StorageManager>,
}

impl SqliteOutboxLocalDataSource {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl OutboxLocalDataSource for SqliteOutboxLocalDataSource {
    async fn add(&self, user_id: &UserId, message_id: &MessageId) -> Result<()> {
        let user = user_id.clone();
        let id = message_id.clone();
        self.storage
            .write(user_id, &[Table::Outbox], move |tx| OutboxDao::new(tx).add(&user, &id, now_ms()))
            .await
    }

    async fn remove(&self, user_id: &UserId, message_id: &MessageId) -> Result<()> {
        let user = user_id.clone();
        let id = message_id.clone();
        self.storage
            .write(user_id, &[Table::Outbox], move |tx| {
                OutboxDao::new(tx).remove(&user, &id)?;
                Ok(())
            })
            .await
    }

    async fn all_ids(&self, user_id: &UserId) -> Result<Vec<MessageId>> {
        let user = user_id.clone();
        self.storage
            .read(user_id, move |conn| OutboxDao::new(conn).all_ids(&user))
            .await
    }
}
