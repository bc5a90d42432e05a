//! 消息远端数据源

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::api::ApiClient;
use super::page_query;
use super::resource::{MessageResponse, MessagesResponse};
use crate::error::{DataResult, Result};
use crate::model::{LabelId, Message, MessageId, UserId};
use crate::paging::PageKey;
use crate::storage::queue::{JobKind, JobQueue};

#[async_trait]
pub trait MessageRemoteDataSource: Send + Sync {
    /// # Panics
    /// `page_key.size` 超过远端上限时 panic
    async fn get_messages(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<Message>>;

    async fn get_message(&self, user_id: &UserId, message_id: &MessageId) -> DataResult<Message>;

    fn add_labels_to_messages(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()>;

    fn remove_labels_from_messages(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()>;

    fn mark_read(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()>;

    fn mark_unread(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()>;
}

fn raw_ids(ids: &[MessageId]) -> Vec<String> {
    ids.iter().map(|id| id.0.clone()).collect()
}

pub struct ApiMessageRemoteDataSource {
    api: Arc<ApiClient>,
    queue: JobQueue,
}

impl ApiMessageRemoteDataSource {
    pub fn new(api: Arc<ApiClient>, queue: JobQueue) -> Self {
        Self { api, queue }
    }
}

#[async_trait]
impl MessageRemoteDataSource for ApiMessageRemoteDataSource {
    async fn get_messages(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<Message>> {
        let query = page_query(page_key);
        let response: MessagesResponse = self.api.get(user_id, &["mail", "v4", "messages"], &query).await?;
        debug!(
            "拉取消息页: user={}, key={}, count={}, total={}",
            user_id,
            page_key,
            response.messages.len(),
            response.total
        );
        Ok(response.messages.iter().map(|m| m.to_message(user_id)).collect())
    }

    async fn get_message(&self, user_id: &UserId, message_id: &MessageId) -> DataResult<Message> {
        let path = ["mail", "v4", "messages", message_id.as_str()];
        let response: MessageResponse = self.api.get(user_id, &path, &[]).await?;
        Ok(response.message.to_message(user_id))
    }

    fn add_labels_to_messages(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()> {
        for label_id in label_ids {
            self.queue.enqueue_chunked(
                user_id,
                JobKind::AddMessageLabel {
                    ids: raw_ids(ids),
                    label_id: label_id.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn remove_labels_from_messages(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()> {
        for label_id in label_ids {
            self.queue.enqueue_chunked(
                user_id,
                JobKind::RemoveMessageLabel {
                    ids: raw_ids(ids),
                    label_id: label_id.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn mark_read(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()> {
        self.queue
            .enqueue_chunked(user_id, JobKind::MarkMessagesRead { ids: raw_ids(ids) })?;
        Ok(())
    }

    fn mark_unread(&self, user_id: &UserId, ids: &[MessageId]) -> Result<()> {
        self.queue
            .enqueue_chunked(user_id, JobKind::MarkMessagesUnread { ids: raw_ids(ids) })?;
        Ok(())
    }
}
