//! 会话远端数据源

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::api::ApiClient;
use super::page_query;
use super::resource::{ConversationResponse, ConversationsResponse};
use crate::error::{DataResult, Result};
use crate::model::{ConversationId, ConversationWithContext, ConversationWithMessages, LabelId, UserId};
use crate::paging::PageKey;
use crate::storage::queue::{JobKind, JobQueue};

#[async_trait]
pub trait ConversationRemoteDataSource: Send + Sync {
    /// # Panics
    /// `page_key.size` 超过远端上限时 panic
    async fn get_conversations(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<ConversationWithContext>>;

    async fn get_conversation_with_messages(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> DataResult<ConversationWithMessages>;

    fn add_labels_to_conversations(&self, user_id: &UserId, ids: &[ConversationId], label_ids: &[LabelId]) -> Result<()>;

    fn remove_labels_from_conversations(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<()>;

    fn mark_read(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()>;

    fn mark_unread(&self, user_id: &UserId, ids: &[ConversationId], context_label_id: &LabelId) -> Result<()>;
}

fn raw_ids(ids: &[ConversationId]) -> Vec<String> {
    ids.iter().map(|id| id.0.clone()).collect()
}

pub struct ApiConversationRemoteDataSource {
    api: Arc<ApiClient>,
    queue: JobQueue,
}

impl ApiConversationRemoteDataSource {
    pub fn new(api: Arc<ApiClient>, queue: JobQueue) -> Self {
        Self { api, queue }
    }
}

#[async_trait]
impl ConversationRemoteDataSource for ApiConversationRemoteDataSource {
    async fn get_conversations(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<ConversationWithContext>> {
        let query = page_query(page_key);
        let response: ConversationsResponse = self.api.get(user_id, &["mail", "v4", "conversations"], &query).await?;
        debug!(
            "拉取会话页: user={}, key={}, count={}, total={}",
            user_id,
            page_key,
            response.conversations.len(),
            response.total
        );
        let context = &page_key.filter.label_id;
        Ok(response
            .conversations
            .iter()
            .map(|c| c.to_conversation_with_context(user_id, context))
            .collect())
    }

    async fn get_conversation_with_messages(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> DataResult<ConversationWithMessages> {
        let path = ["mail", "v4", "conversations", conversation_id.as_str()];
        let response: ConversationResponse = self.api.get(user_id, &path, &[]).await?;
        Ok(ConversationWithMessages {
            conversation: response.conversation.to_conversation(user_id),
            messages: response.messages.iter().map(|m| m.to_message(user_id)).collect(),
        })
    }

    fn add_labels_to_conversations(&self, user_id: &UserId, ids: &[ConversationId], label_ids: &[LabelId]) -> Result<()> {
        for label_id in label_ids {
            self.queue.enqueue_chunked(
                user_id,
                JobKind::AddConversationLabel {
                    ids: raw_ids(ids),
                    label_id: label_id.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn remove_labels_from_conversations(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<()> {
        for label_id in label_ids {
            self.queue.enqueue_chunked(
                user_id,
                JobKind::RemoveConversationLabel {
                    ids: raw_ids(ids),
                    label_id: label_id.clone(),
                },
            )?;
        }
        Ok(())
    }

    fn mark_read(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<()> {
        self.queue
            .enqueue_chunked(user_id, JobKind::MarkConversationsRead { ids: raw_ids(ids) })?;
        Ok(())
    }

    fn mark_unread(&self, user_id: &UserId, ids: &[ConversationId], context_label_id: &LabelId) -> Result<()> {
        self.queue.enqueue_chunked(
            user_id,
            JobKind::MarkConversationsUnread {
                ids: raw_ids(ids),
                label_id: context_label_id.clone(),
            },
        )?;
        Ok(())
    }
}
