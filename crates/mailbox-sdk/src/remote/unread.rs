//! 未读计数远端数据源

use std::sync::Arc;

use async_trait::async_trait;

use super::api::ApiClient;
use super::resource::CountsResponse;
use crate::error::DataResult;
use crate::model::{UnreadCount, UserId};

#[async_trait]
pub trait UnreadCountRemoteDataSource: Send + Sync {
    async fn get_message_counters(&self, user_id: &UserId) -> DataResult<Vec<UnreadCount>>;
    async fn get_conversation_counters(&self, user_id: &UserId) -> DataResult<Vec<UnreadCount>>;
}

pub struct ApiUnreadCountRemoteDataSource {
    api: Arc<ApiClient>,
}

impl ApiUnreadCountRemoteDataSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    async fn counts(&self, user_id: &UserId, path: &[&str]) -> DataResult<Vec<UnreadCount>> {
        let response: CountsResponse = self.api.get(user_id, path, &[]).await?;
        Ok(response.counts.iter().map(UnreadCount::from).collect())
    }
}

#[async_trait]
impl UnreadCountRemoteDataSource for ApiUnreadCountRemoteDataSource {
    async fn get_message_counters(&self, user_id: &UserId) -> DataResult<Vec<UnreadCount>> {
        self.counts(user_id, &["mail", "v4", "messages", "count"]).await
    }

    async fn get_conversation_counters(&self, user_id: &UserId) -> DataResult<Vec<UnreadCount>> {
        self.counts(user_id, &["mail", "v4", "conversations", "count"]).await
    }
}
