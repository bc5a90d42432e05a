//! 事件远端数据源 - 增量同步的游标与事件批次

use std::sync::Arc;

use async_trait::async_trait;

use super::api::ApiClient;
use super::resource::LatestEventResponse;
use crate::error::DataResult;
use crate::model::UserId;
use crate::sync::EventEnvelope;

#[async_trait]
pub trait EventRemoteDataSource: Send + Sync {
    /// 当前最新的事件 ID，首次同步时作为起点
    async fn get_latest_event_id(&self, user_id: &UserId) -> DataResult<String>;

    /// `since` 之后的一批事件
    async fn get_events(&self, user_id: &UserId, since: &str) -> DataResult<EventEnvelope>;
}

pub struct ApiEventRemoteDataSource {
    api: Arc<ApiClient>,
}

impl ApiEventRemoteDataSource {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventRemoteDataSource for ApiEventRemoteDataSource {
    async fn get_latest_event_id(&self, user_id: &UserId) -> DataResult<String> {
        let response: LatestEventResponse = self.api.get(user_id, &["core", "v4", "events", "latest"], &[]).await?;
        Ok(response.event_id)
    }

    async fn get_events(&self, user_id: &UserId, since: &str) -> DataResult<EventEnvelope> {
        let path = ["core", "v4", "events", since];
        self.api.get(user_id, &path, &[]).await
    }
}
