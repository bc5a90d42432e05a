//! 消息本地数据源

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{DataError, MailboxSdkError, Result};
use crate::events::Table;
use crate::model::{ConversationId, LabelId, Message, MessageId, UserId};
use crate::paging::{clipped_page_key, is_local_page_valid, PageItemType, PageKey};
use crate::storage::dao::{MessageDao, PageIntervalDao};
use crate::storage::StorageManager;

const MESSAGE_WRITE: &[Table] = &[Table::Message, Table::MessageLabel, Table::PageInterval];

#[async_trait]
pub trait MessageLocalDataSource: Send + Sync {
    fn observe_messages(&self, user_id: &UserId, page_key: &PageKey) -> BoxStream<'static, Result<Vec<Message>>>;

    fn observe_message(&self, user_id: &UserId, message_id: &MessageId) -> BoxStream<'static, Result<Option<Message>>>;

    fn observe_messages_in_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, Result<Vec<Message>>>;

    async fn get_messages(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<Message>>;

    async fn get_message(&self, user_id: &UserId, message_id: &MessageId) -> Result<Option<Message>>;

    async fn get_messages_by_ids(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>>;

    async fn get_messages_in_conversation(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Message>>;

    async fn is_message_read(&self, user_id: &UserId, message_id: &MessageId) -> Result<bool>;

    /// 写入一页结果，同时记录该页的已拉取区间
    async fn upsert_messages(&self, user_id: &UserId, page_key: &PageKey, items: Vec<Message>) -> Result<()>;

    async fn upsert_message_list(&self, user_id: &UserId, items: Vec<Message>) -> Result<()>;

    async fn delete_messages(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()>;

    /// 删除除 keep 之外的全部消息以及消息类型的分页区间
    async fn delete_all_messages_except(&self, user_id: &UserId, keep: &[MessageId]) -> Result<()>;

    async fn delete_messages_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<()>;

    async fn delete_messages_in_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()>;

    async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> Result<()>;

    async fn is_local_page_valid(&self, user_id: &UserId, page_key: &PageKey, items: &[Message]) -> Result<bool>;

    async fn get_clipped_page_key(&self, user_id: &UserId, page_key: &PageKey) -> Result<Option<PageKey>>;

    async fn add_labels(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<Vec<Message>>;

    async fn add_label(&self, user_id: &UserId, ids: &[MessageId], label_id: &LabelId) -> Result<Vec<Message>> {
        self.add_labels(user_id, ids, std::slice::from_ref(label_id)).await
    }

    async fn remove_labels(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<Vec<Message>>;

    async fn remove_label(&self, user_id: &UserId, ids: &[MessageId], label_id: &LabelId) -> Result<Vec<Message>> {
        self.remove_labels(user_id, ids, std::slice::from_ref(label_id)).await
    }

    async fn relabel_messages(
        &self,
        user_id: &UserId,
        ids: &[MessageId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> Result<Vec<Message>>;

    async fn mark_read(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>>;

    async fn mark_unread(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>>;
}

pub fn relabeled(mut message: Message, add: &[LabelId], remove: &[LabelId]) -> Message {
    message.label_ids.retain(|label| !remove.contains(label));
    message.label_ids.extend(add.iter().cloned());
    message.with_normalized_labels()
}

pub fn upsert_message_list_tx(conn: &Connection, messages: &[Message]) -> Result<()> {
    let dao = MessageDao::new(conn);
    for message in messages {
        dao.upsert(message)?;
    }
    Ok(())
}

fn update_messages_tx<F>(conn: &Connection, user_id: &UserId, ids: &[MessageId], update: F) -> Result<Vec<Message>>
where
    F: Fn(Message) -> Message,
{
    let messages = MessageDao::new(conn).get_many(user_id, ids)?;
    if messages.is_empty() {
        return Err(MailboxSdkError::Data(DataError::no_data_cached()));
    }
    let updated: Vec<Message> = messages.into_iter().map(update).collect();
    upsert_message_list_tx(conn, &updated)?;
    Ok(updated)
}

pub struct SqliteMessageLocalDataSource {
    storage: Arc<StorageManager>,
}

impl SqliteMessageLocalDataSource {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }

    async fn update<F>(&self, user_id: &UserId, ids: &[MessageId], update: F) -> Result<Vec<Message>>
    where
        F: Fn(Message) -> Message + Send + 'static,
    {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .write(user_id, Table::MESSAGES, move |tx| update_messages_tx(tx, &user, &ids, update))
            .await
    }

    async fn intervals(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<crate::paging::PageInterval>> {
        let user = user_id.clone();
        let key = page_key.clone();
        self.storage
            .read(user_id, move |conn| {
                PageIntervalDao::new(conn).get_all(&user, PageItemType::Message, &key)
            })
            .await
    }
}

#[async_trait]
impl MessageLocalDataSource for SqliteMessageLocalDataSource {
    fn observe_messages(&self, user_id: &UserId, page_key: &PageKey) -> BoxStream<'static, Result<Vec<Message>>> {
        let user = user_id.clone();
        let key = page_key.clone();
        self.storage.observe(
            user_id,
            Table::MESSAGES,
            Arc::new(move |conn: &Connection| MessageDao::new(conn).get_page(&user, &key)),
        )
    }

    fn observe_message(&self, user_id: &UserId, message_id: &MessageId) -> BoxStream<'static, Result<Option<Message>>> {
        let user = user_id.clone();
        let id = message_id.clone();
        self.storage.observe(
            user_id,
            Table::MESSAGES,
            Arc::new(move |conn: &Connection| MessageDao::new(conn).get(&user, &id)),
        )
    }

    fn observe_messages_in_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, Result<Vec<Message>>> {
        let user = user_id.clone();
        let ids = vec![conversation_id.clone()];
        self.storage.observe(
            user_id,
            Table::MESSAGES,
            Arc::new(move |conn: &Connection| MessageDao::new(conn).get_in_conversations(&user, &ids)),
        )
    }

    async fn get_messages(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<Message>> {
        let user = user_id.clone();
        let key = page_key.clone();
        self.storage
            .read(user_id, move |conn| MessageDao::new(conn).get_page(&user, &key))
            .await
    }

    async fn get_message(&self, user_id: &UserId, message_id: &MessageId) -> Result<Option<Message>> {
        let user = user_id.clone();
        let id = message_id.clone();
        self.storage
            .read(user_id, move |conn| MessageDao::new(conn).get(&user, &id))
            .await
    }

    async fn get_messages_by_ids(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .read(user_id, move |conn| MessageDao::new(conn).get_many(&user, &ids))
            .await
    }

    async fn get_messages_in_conversation(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Message>> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .read(user_id, move |conn| MessageDao::new(conn).get_in_conversations(&user, &ids))
            .await
    }

    async fn is_message_read(&self, user_id: &UserId, message_id: &MessageId) -> Result<bool> {
        match self.get_message(user_id, message_id).await? {
            Some(message) => Ok(!message.unread),
            None => Err(MailboxSdkError::Data(DataError::no_data_cached())),
        }
    }

    async fn upsert_messages(&self, user_id: &UserId, page_key: &PageKey, items: Vec<Message>) -> Result<()> {
        let user = user_id.clone();
        let key = page_key.clone();
        debug!("写入消息页: user={}, key={}, count={}", user_id, page_key, items.len());
        self.storage
            .write(user_id, MESSAGE_WRITE, move |tx| {
                upsert_message_list_tx(tx, &items)?;
                PageIntervalDao::new(tx).upsert_for_page(&user, PageItemType::Message, &key, &items)?;
                Ok(())
            })
            .await
    }

    async fn upsert_message_list(&self, user_id: &UserId, items: Vec<Message>) -> Result<()> {
        self.storage
            .write(user_id, Table::MESSAGES, move |tx| upsert_message_list_tx(tx, &items))
            .await
    }

    async fn delete_messages(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .write(user_id, Table::MESSAGES, move |tx| {
                MessageDao::new(tx).delete(&user, &ids)?;
                Ok(())
            })
            .await
    }

    async fn delete_all_messages_except(&self, user_id: &UserId, keep: &[MessageId]) -> Result<()> {
        let user = user_id.clone();
        let keep = keep.to_vec();
        self.storage
            .write(user_id, MESSAGE_WRITE, move |tx| {
                MessageDao::new(tx).delete_all_except(&user, &keep)?;
                PageIntervalDao::new(tx).delete_all(&user, PageItemType::Message)?;
                Ok(())
            })
            .await
    }

    async fn delete_messages_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<()> {
        let user = user_id.clone();
        let label = label_id.clone();
        self.storage
            .write(user_id, Table::MESSAGES, move |tx| {
                MessageDao::new(tx).delete_with_label(&user, &label)?;
                Ok(())
            })
            .await
    }

    async fn delete_messages_in_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .write(user_id, Table::MESSAGES, move |tx| {
                MessageDao::new(tx).delete_in_conversations(&user, &ids)?;
                Ok(())
            })
            .await
    }

    async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> Result<()> {
        let user = user_id.clone();
        let label = label_id.clone();
        self.storage
            .write(user_id, &[Table::PageInterval], move |tx| {
                PageIntervalDao::new(tx).delete_for_label(&user, PageItemType::Message, &label)?;
                Ok(())
            })
            .await
    }

    async fn is_local_page_valid(&self, user_id: &UserId, page_key: &PageKey, items: &[Message]) -> Result<bool> {
        let intervals = self.intervals(user_id, page_key).await?;
        Ok(is_local_page_valid(&intervals, page_key, items))
    }

    async fn get_clipped_page_key(&self, user_id: &UserId, page_key: &PageKey) -> Result<Option<PageKey>> {
        let intervals = self.intervals(user_id, page_key).await?;
        Ok(clipped_page_key(&intervals, page_key))
    }

    async fn add_labels(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<Vec<Message>> {
        let add = label_ids.to_vec();
        self.update(user_id, ids, move |m| relabeled(m, &add, &[])).await
    }

    async fn remove_labels(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<Vec<Message>> {
        let remove = label_ids.to_vec();
        self.update(user_id, ids, move |m| relabeled(m, &[], &remove)).await
    }

    async fn relabel_messages(
        &self,
        user_id: &UserId,
        ids: &[MessageId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> Result<Vec<Message>> {
        let add = label_ids_to_add.to_vec();
        let remove = label_ids_to_remove.to_vec();
        self.update(user_id, ids, move |m| relabeled(m, &add, &remove)).await
    }

    async fn mark_read(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.update(user_id, ids, |mut m| {
            m.unread = false;
            m
        })
        .await
    }

    async fn mark_unread(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.update(user_id, ids, |mut m| {
            m.unread = true;
            m
        })
        .await
    }
}
