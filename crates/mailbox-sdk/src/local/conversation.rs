//! 会话本地数据源 - 页面读取、观察流、分页区间，以及本地的 label / 已读变更

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{DataError, MailboxSdkError, Result};
use crate::events::Table;
use crate::model::{Conversation, ConversationId, ConversationLabel, ConversationWithContext, LabelId, UserId};
use crate::paging::{clipped_page_key, is_local_page_valid, PageItemType, PageKey};
use crate::storage::dao::{ConversationDao, PageIntervalDao};
use crate::storage::StorageManager;

const CONVERSATION_WRITE: &[Table] = &[Table::Conversation, Table::ConversationLabel, Table::PageInterval];

#[async_trait]
pub trait ConversationLocalDataSource: Send + Sync {
    fn observe_conversations(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
    ) -> BoxStream<'static, Result<Vec<ConversationWithContext>>>;

    fn observe_cached_conversations(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
    ) -> BoxStream<'static, Result<Vec<Conversation>>>;

    fn observe_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, Result<Option<Conversation>>>;

    async fn get_conversations(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<ConversationWithContext>>;

    async fn get_conversation(&self, user_id: &UserId, conversation_id: &ConversationId) -> Result<Option<Conversation>>;

    async fn get_conversations_by_ids(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Conversation>>;

    /// 未缓存时返回 NoDataCached
    async fn is_conversation_read(&self, user_id: &UserId, conversation_id: &ConversationId) -> Result<bool>;

    /// 写入一页结果，同时记录该页的已拉取区间
    async fn upsert_conversations(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
        items: Vec<ConversationWithContext>,
    ) -> Result<()>;

    async fn upsert_conversation(&self, user_id: &UserId, conversation: Conversation) -> Result<()>;

    async fn upsert_conversation_list(&self, user_id: &UserId, conversations: Vec<Conversation>) -> Result<()>;

    async fn delete_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()>;

    /// 删除全部会话以及会话类型的分页区间
    async fn delete_all_conversations(&self, user_id: &UserId) -> Result<()>;

    /// 删除除 keep 之外的全部会话以及会话类型的分页区间
    async fn delete_all_conversations_except(&self, user_id: &UserId, keep: &[ConversationId]) -> Result<()>;

    async fn delete_conversations_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<()>;

    async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> Result<()>;

    async fn is_local_page_valid(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
        items: &[ConversationWithContext],
    ) -> Result<bool>;

    async fn get_clipped_page_key(&self, user_id: &UserId, page_key: &PageKey) -> Result<Option<PageKey>>;

    async fn add_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<Vec<Conversation>>;

    async fn add_label(&self, user_id: &UserId, ids: &[ConversationId], label_id: &LabelId) -> Result<Vec<Conversation>> {
        self.add_labels(user_id, ids, std::slice::from_ref(label_id)).await
    }

    async fn remove_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<Vec<Conversation>>;

    async fn remove_label(&self, user_id: &UserId, ids: &[ConversationId], label_id: &LabelId) -> Result<Vec<Conversation>> {
        self.remove_labels(user_id, ids, std::slice::from_ref(label_id)).await
    }

    async fn relabel(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> Result<Vec<Conversation>>;

    async fn mark_read(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Conversation>>;

    async fn mark_unread(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        context_label_id: &LabelId,
    ) -> Result<Vec<Conversation>>;
}

/// 追加 label：新上下文行沿用最大的 context_time 及会话整体的消息 / 未读 / 附件数
pub fn with_labels_added(mut conversation: Conversation, label_ids: &[LabelId]) -> Conversation {
    let context_time = conversation.latest_context_time();
    for label_id in label_ids {
        if conversation.has_label(label_id) {
            continue;
        }
        conversation.labels.push(ConversationLabel {
            conversation_id: conversation.conversation_id.clone(),
            label_id: label_id.clone(),
            context_time,
            context_size: 0,
            context_num_messages: conversation.num_messages,
            context_num_unread: conversation.num_unread,
            context_num_attachments: conversation.num_attachments,
        });
    }
    conversation
}

pub fn with_labels_removed(mut conversation: Conversation, label_ids: &[LabelId]) -> Conversation {
    conversation.labels.retain(|label| !label_ids.contains(&label.label_id));
    conversation
}

/// 所有上下文未读清零，整体未读数减一（不小于 0）
pub fn marked_read(mut conversation: Conversation) -> Conversation {
    for label in &mut conversation.labels {
        label.context_num_unread = 0;
    }
    conversation.num_unread = (conversation.num_unread - 1).max(0);
    conversation
}

/// 上下文 label 与整体未读数各加一（不超过消息数）
pub fn marked_unread(mut conversation: Conversation, context_label_id: &LabelId) -> Conversation {
    for label in &mut conversation.labels {
        if &label.label_id == context_label_id {
            label.context_num_unread = (label.context_num_unread + 1).min(label.context_num_messages);
        }
    }
    conversation.num_unread = (conversation.num_unread + 1).min(conversation.num_messages);
    conversation
}

/// 事务内批量写入会话（供事件监听器组合使用）
pub fn upsert_conversation_list_tx(conn: &Connection, conversations: &[Conversation]) -> Result<()> {
    let dao = ConversationDao::new(conn);
    for conversation in conversations {
        dao.upsert(conversation)?;
    }
    Ok(())
}

/// 读取 → 变换 → 写回，同一事务内完成；一条都没有缓存时返回 NoDataCached
fn update_conversations_tx<F>(
    conn: &Connection,
    user_id: &UserId,
    ids: &[ConversationId],
    update: F,
) -> Result<Vec<Conversation>>
where
    F: Fn(Conversation) -> Conversation,
{
    let dao = ConversationDao::new(conn);
    let conversations = dao.get_many(user_id, ids)?;
    if conversations.is_empty() {
        return Err(MailboxSdkError::Data(DataError::no_data_cached()));
    }
    let updated: Vec<Conversation> = conversations.into_iter().map(update).collect();
    upsert_conversation_list_tx(conn, &updated)?;
    Ok(updated)
}

pub struct SqliteConversationLocalDataSource {
    storage: Arc<StorageManager>,
}

impl SqliteConversationLocalDataSource {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        Self { storage }
    }

    async fn update<F>(&self, user_id: &UserId, ids: &[ConversationId], update: F) -> Result<Vec<Conversation>>
    where
        F: Fn(Conversation) -> Conversation + Send + 'static,
    {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .write(user_id, Table::CONVERSATIONS, move |tx| {
                update_conversations_tx(tx, &user, &ids, update)
            })
            .await
    }
}

#[async_trait]
impl ConversationLocalDataSource for SqliteConversationLocalDataSource {
    fn observe_conversations(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
    ) -> BoxStream<'static, Result<Vec<ConversationWithContext>>> {
        let user = user_id.clone();
        let key = page_key.clone();
        self.storage.observe(
            user_id,
            Table::CONVERSATIONS,
            Arc::new(move |conn: &Connection| ConversationDao::new(conn).get_page(&user, &key)),
        )
    }

    fn observe_cached_conversations(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
    ) -> BoxStream<'static, Result<Vec<Conversation>>> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage.observe(
            user_id,
            Table::CONVERSATIONS,
            Arc::new(move |conn: &Connection| ConversationDao::new(conn).get_many(&user, &ids)),
        )
    }

    fn observe_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, Result<Option<Conversation>>> {
        let user = user_id.clone();
        let id = conversation_id.clone();
        self.storage.observe(
            user_id,
            Table::CONVERSATIONS,
            Arc::new(move |conn: &Connection| ConversationDao::new(conn).get(&user, &id)),
        )
    }

    async fn get_conversations(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<ConversationWithContext>> {
        let user = user_id.clone();
        let key = page_key.clone();
        self.storage
            .read(user_id, move |conn| ConversationDao::new(conn).get_page(&user, &key))
            .await
    }

    async fn get_conversation(&self, user_id: &UserId, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let user = user_id.clone();
        let id = conversation_id.clone();
        self.storage
            .read(user_id, move |conn| ConversationDao::new(conn).get(&user, &id))
            .await
    }

    async fn get_conversations_by_ids(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .read(user_id, move |conn| ConversationDao::new(conn).get_many(&user, &ids))
            .await
    }

    async fn is_conversation_read(&self, user_id: &UserId, conversation_id: &ConversationId) -> Result<bool> {
        match self.get_conversation(user_id, conversation_id).await? {
            Some(conversation) => Ok(conversation.num_unread == 0),
            None => Err(MailboxSdkError::Data(DataError::no_data_cached())),
        }
    }

    async fn upsert_conversations(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
        items: Vec<ConversationWithContext>,
    ) -> Result<()> {
        let user = user_id.clone();
        let key = page_key.clone();
        debug!("写入会话页: user={}, key={}, count={}", user_id, page_key, items.len());
        self.storage
            .write(user_id, CONVERSATION_WRITE, move |tx| {
                let dao = ConversationDao::new(tx);
                for item in &items {
                    dao.upsert(&item.conversation)?;
                }
                PageIntervalDao::new(tx).upsert_for_page(&user, PageItemType::Conversation, &key, &items)?;
                Ok(())
            })
            .await
    }

    async fn upsert_conversation(&self, user_id: &UserId, conversation: Conversation) -> Result<()> {
        self.upsert_conversation_list(user_id, vec![conversation]).await
    }

    async fn upsert_conversation_list(&self, user_id: &UserId, conversations: Vec<Conversation>) -> Result<()> {
        self.storage
            .write(user_id, Table::CONVERSATIONS, move |tx| {
                upsert_conversation_list_tx(tx, &conversations)
            })
            .await
    }

    async fn delete_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()> {
        let user = user_id.clone();
        let ids = ids.to_vec();
        self.storage
            .write(user_id, Table::CONVERSATIONS, move |tx| {
                ConversationDao::new(tx).delete(&user, &ids)?;
                Ok(())
            })
            .await
    }

    async fn delete_all_conversations(&self, user_id: &UserId) -> Result<()> {
        let user = user_id.clone();
        self.storage
            .write(user_id, CONVERSATION_WRITE, move |tx| {
                ConversationDao::new(tx).delete_all(&user)?;
                PageIntervalDao::new(tx).delete_all(&user, PageItemType::Conversation)?;
                Ok(())
            })
            .await
    }

    async fn delete_all_conversations_except(&self, user_id: &UserId, keep: &[ConversationId]) -> Result<()> {
        let user = user_id.clone();
        let keep = keep.to_vec();
        self.storage
            .write(user_id, CONVERSATION_WRITE, move |tx| {
                let removed = ConversationDao::new(tx).delete_all_except(&user, &keep)?;
                PageIntervalDao::new(tx).delete_all(&user, PageItemType::Conversation)?;
                debug!("重置会话缓存: 删除 {} 条，保留 {} 条", removed, keep.len());
                Ok(())
            })
            .await
    }

    async fn delete_conversations_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<()> {
        let user = user_id.clone();
        let label = label_id.clone();
        self.storage
            .write(user_id, Table::CONVERSATIONS, move |tx| {
                ConversationDao::new(tx).delete_with_label(&user, &label)?;
                Ok(())
            })
            .await
    }

    async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> Result<()> {
        let user = user_id.clone();
        let label = label_id.clone();
        self.storage
            .write(user_id, &[Table::PageInterval], move |tx| {
                PageIntervalDao::new(tx).delete_for_label(&user, PageItemType::Conversation, &label)?;
                Ok(())
            })
            .await
    }

    async fn is_local_page_valid(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
        items: &[ConversationWithContext],
    ) -> Result<bool> {
        let user = user_id.clone();
        let key = page_key.clone();
        let intervals = self
            .storage
            .read(user_id, move |conn| {
                PageIntervalDao::new(conn).get_all(&user, PageItemType::Conversation, &key)
            })
            .await?;
        Ok(is_local_page_valid(&intervals, page_key, items))
    }

    async fn get_clipped_page_key(&self, user_id: &UserId, page_key: &PageKey) -> Result<Option<PageKey>> {
        let user = user_id.clone();
        let key = page_key.clone();
        let intervals = self
            .storage
            .read(user_id, move |conn| {
                PageIntervalDao::new(conn).get_all(&user, PageItemType::Conversation, &key)
            })
            .await?;
        Ok(clipped_page_key(&intervals, page_key))
    }

    async fn add_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<Vec<Conversation>> {
        let label_ids = label_ids.to_vec();
        self.update(user_id, ids, move |c| with_labels_added(c, &label_ids))
            .await
    }

    async fn remove_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<Vec<Conversation>> {
        let label_ids = label_ids.to_vec();
        self.update(user_id, ids, move |c| with_labels_removed(c, &label_ids))
            .await
    }

    async fn relabel(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> Result<Vec<Conversation>> {
        let add = label_ids_to_add.to_vec();
        let remove = label_ids_to_remove.to_vec();
        self.update(user_id, ids, move |c| {
            with_labels_added(with_labels_removed(c, &remove), &add)
        })
        .await
    }

    async fn mark_read(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        self.update(user_id, ids, marked_read).await
    }

    async fn mark_unread(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        context_label_id: &LabelId,
    ) -> Result<Vec<Conversation>> {
        let context = context_label_id.clone();
        self.update(user_id, ids, move |c| marked_unread(c, &context))
            .await
    }
}
