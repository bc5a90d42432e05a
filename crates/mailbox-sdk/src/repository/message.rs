//! 消息仓库

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use super::store::{cached_with_refresh, map_local, SharedFlights, SingleFlight};
use crate::error::DataResult;
use crate::local::MessageLocalDataSource;
use crate::model::{ConversationId, LabelId, Message, MessageId, UserId};
use crate::paging::PageKey;
use crate::remote::MessageRemoteDataSource;

pub struct MessageRepository {
    local: Arc<dyn MessageLocalDataSource>,
    remote: Arc<dyn MessageRemoteDataSource>,
    flights: SharedFlights<(UserId, MessageId)>,
}

impl MessageRepository {
    pub fn new(local: Arc<dyn MessageLocalDataSource>, remote: Arc<dyn MessageRemoteDataSource>) -> Self {
        Self {
            local,
            remote,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub async fn get_messages(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<Message>> {
        let page_key = page_key.clone().clamped();
        let local_items = self.local.get_messages(user_id, &page_key).await?;
        if self.local.is_local_page_valid(user_id, &page_key, &local_items).await? {
            debug!("消息页命中缓存: user={}, label={}", user_id, page_key.filter.label_id);
            return Ok(local_items);
        }

        let Some(fetch_key) = self.local.get_clipped_page_key(user_id, &page_key).await? else {
            return Ok(local_items);
        };
        match self.remote.get_messages(user_id, &fetch_key).await {
            Ok(remote_items) => {
                self.local.upsert_messages(user_id, &fetch_key, remote_items).await?;
                Ok(self.local.get_messages(user_id, &page_key).await?)
            }
            Err(e) => {
                warn!("⚠️ 拉取消息页失败，返回缓存: user={}, error={}", user_id, e);
                Ok(local_items)
            }
        }
    }

    pub fn observe_message(&self, user_id: &UserId, message_id: &MessageId) -> BoxStream<'static, DataResult<Message>> {
        let cache = self.local.observe_message(user_id, message_id);
        let flights = self.flights.clone();
        let local = self.local.clone();
        let remote = self.remote.clone();
        let user_id = user_id.clone();
        let message_id = message_id.clone();
        let refresh = async move {
            let key = (user_id.clone(), message_id.clone());
            flights
                .run(key, move || async move {
                    let message = remote.get_message(&user_id, &message_id).await?;
                    local.upsert_message_list(&user_id, vec![message]).await?;
                    Ok(())
                })
                .await
        };
        cached_with_refresh(cache, refresh)
    }

    pub fn observe_messages_in_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, DataResult<Vec<Message>>> {
        map_local(self.local.observe_messages_in_conversation(user_id, conversation_id))
    }

    pub async fn add_labels(&self, user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> DataResult<Vec<Message>> {
        self.relabel(user_id, ids, label_ids, &[]).await
    }

    pub async fn remove_labels(
        &self,
        user_id: &UserId,
        ids: &[MessageId],
        label_ids: &[LabelId],
    ) -> DataResult<Vec<Message>> {
        self.relabel(user_id, ids, &[], label_ids).await
    }

    pub async fn relabel(
        &self,
        user_id: &UserId,
        ids: &[MessageId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> DataResult<Vec<Message>> {
        let messages = self
            .local
            .relabel_messages(user_id, ids, label_ids_to_add, label_ids_to_remove)
            .await?;
        if !label_ids_to_add.is_empty() {
            self.remote.add_labels_to_messages(user_id, ids, label_ids_to_add)?;
        }
        if !label_ids_to_remove.is_empty() {
            self.remote.remove_labels_from_messages(user_id, ids, label_ids_to_remove)?;
        }
        info!("消息标签已变更: user={}, messages={}", user_id, messages.len());
        Ok(messages)
    }

    pub async fn mark_read(&self, user_id: &UserId, ids: &[MessageId]) -> DataResult<Vec<Message>> {
        let messages = self.local.mark_read(user_id, ids).await?;
        self.remote.mark_read(user_id, ids)?;
        Ok(messages)
    }

    pub async fn mark_unread(&self, user_id: &UserId, ids: &[MessageId]) -> DataResult<Vec<Message>> {
        let messages = self.local.mark_unread(user_id, ids).await?;
        self.remote.mark_unread(user_id, ids)?;
        Ok(messages)
    }

    pub async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> DataResult<()> {
        self.local.mark_as_stale(user_id, label_id).await?;
        Ok(())
    }
}
