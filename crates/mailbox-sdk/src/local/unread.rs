//! 未读计数本地数据源

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rusqlite::Connection;

use crate::error::Result;
use crate::events::Table;
use crate::model::{CounterKind, UnreadCount, UserId};
use crate::storage::dao::UnreadCountDao;
use crate::storage::StorageManager;

#[async_trait]
pub trait UnreadCountLocalDataSource: Send + Sync {
    fn observe_message_counters(&self, user_id: &UserId) -> BoxStream<'static, Result<Vec<UnreadCount>>>;

    fn observe_conversation_counters(&self, user_id: &UserId) -> BoxStream<'static, Result<Vec<UnreadCount>>>;

    async fn save_message_counters(&self, user_id: &UserId, counters: Vec<UnreadCount>) -> Result<()>;

    async fn save_conversation_counters(&self, user_id: &UserId, counters: Vec<UnreadCount>) -> Result<()>;

    async fn update_message_counter(&self, user_id: &UserId, counter: UnreadCount) -> Result<()>;

    async fn update_conversation_counter(&self, user_id: &UserId, counter: UnreadCount) -> Result<()>;

    /// 清空两类计数
    async fn delete_all(&self, user_id: &UserId) -> Result<()>;
}

pub fn save_counters_tx(conn: &Connection, user_id: &UserId, kind: CounterKind, counters: &[UnreadCount]) -> Result<()> {
    let dao = UnreadCountDao::new(conn, kind);
    for counter in counters {
        dao.upsert(user_id, counter)?;
    }
    Ok(())
}

fn table_of(kind: CounterKind) -> &'static [Table] {
    match kind {
        CounterKind::Messages => &[Table::UnreadMessagesCount],
        CounterKind::Conversations => &[Table::UnreadConversationsCount],
    }
}

pub struct SqliteUnreadCountLocalDataSource {
    storage: Arc<StorageManager>,
}

impl SqliteUnreadCountLocalDataSource {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }

    fn observe(&self, user_id: &UserId, kind: CounterKind) -> BoxStream<'static, Result<Vec<UnreadCount>>> {
        let user = user_id.clone();
        self.storage.observe(
            user_id,
            table_of(kind),
            Arc::new(move |conn: &Connection| UnreadCountDao::new(conn, kind).get_all(&user)),
        )
    }

    async fn save(&self, user_id: &UserId, kind: CounterKind, counters: Vec<UnreadCount>) -> Result<()> {
        let user = user_id.clone();
        self.storage
            .write(user_id, table_of(kind), move |tx| save_counters_tx(tx, &user, kind, &counters))
            .await
    }
}

#[async_trait]
impl UnreadCountLocalDataSource for SqliteUnreadCountLocalDataSource {
    fn observe_message_counters(&self, user_id: &UserId) -> BoxStream<'static, Result<Vec<UnreadCount>>> {
        self.observe(user_id, CounterKind::Messages)
    }

    fn observe_conversation_counters(&self, user_id: &UserId) -> BoxStream<'static, Result<Vec<UnreadCount>>> {
        self.observe(user_id, CounterKind::Conversations)
    }

    async fn save_message_counters(&self, user_id: &UserId, counters: Vec<UnreadCount>) -> Result<()> {
        self.save(user_id, CounterKind::Messages, counters).await
    }

    async fn save_conversation_counters(&self, user_id: &UserId, counters: Vec<UnreadCount>) -> Result<()> {
        self.save(user_id, CounterKind::Conversations, counters).await
    }

    async fn update_message_counter(&self, user_id: &UserId, counter: UnreadCount) -> Result<()> {
        self.save(user_id, CounterKind::Messages, vec![counter]).await
    }

    async fn update_conversation_counter(&self, user_id: &UserId, counter: UnreadCount) -> Result<()> {
        self.save(user_id, CounterKind::Conversations, vec![counter]).await
    }

    async fn delete_all(&self, user_id: &UserId) -> Result<()> {
        let user = user_id.clone();
        self.storage
            .write(user_id, Table::UNREAD_COUNTS, move |tx| {
                UnreadCountDao::new(tx, CounterKind::Messages).delete_all(&user)?;
                UnreadCountDao::new(tx, CounterKind::Conversations).delete_all(&user)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelId;
    use futures::StreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn counters_are_observed_per_kind() {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path(), 32).await.unwrap();
        let user = UserId::from("u1");
        storage.init_user(&user).await.unwrap();
        let local = SqliteUnreadCountLocalDataSource::new(storage.clone());

        let mut messages = local.observe_message_counters(&user);
        assert!(messages.next().await.unwrap().unwrap().is_empty());

        let inbox = UnreadCount {
            label_id: LabelId::from("0"),
            total: 5,
            unread: 2,
        };
        local.save_message_counters(&user, vec![inbox.clone()]).await.unwrap();
        assert_eq!(messages.next().await.unwrap().unwrap(), vec![inbox]);

        local.delete_all(&user).await.unwrap();
        assert!(messages.next().await.unwrap().unwrap().is_empty());
        storage.shutdown().await;
    }
}
