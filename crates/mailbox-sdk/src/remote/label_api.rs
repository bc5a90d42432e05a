//! 标签 / 已读状态的 PUT 接口，由任务队列在后台调用

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::api::ApiClient;
use super::resource::{CodeResponse, IdsBody, LabelIdsBody};
use crate::error::{DataError, DataResult, LocalError};
use crate::model::UserId;
use crate::storage::queue::{JobExecutor, JobKind};

pub struct LabelApi {
    api: Arc<ApiClient>,
}

impl LabelApi {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    async fn put_label(&self, user_id: &UserId, path: &[&str], label_id: &str, ids: &[String]) -> DataResult<()> {
        if label_id.trim().is_empty() {
            return Err(DataError::Local(LocalError::Unknown("标签 ID 为空".into())));
        }
        let _: CodeResponse = self
            .api
            .put(user_id, path, &LabelIdsBody { label_id, ids })
            .await?;
        Ok(())
    }

    async fn put_ids(&self, user_id: &UserId, path: &[&str], ids: &[String]) -> DataResult<()> {
        let _: CodeResponse = self.api.put(user_id, path, &IdsBody { ids }).await?;
        Ok(())
    }
}

/// 任务类型对应的接口路径
pub fn endpoint(kind: &JobKind) -> [&'static str; 4] {
    let (resource, action) = match kind {
        JobKind::AddConversationLabel { .. } => ("conversations", "label"),
        JobKind::RemoveConversationLabel { .. } => ("conversations", "unlabel"),
        JobKind::MarkConversationsRead { .. } => ("conversations", "read"),
        JobKind::MarkConversationsUnread { .. } => ("conversations", "unread"),
        JobKind::AddMessageLabel { .. } => ("messages", "label"),
        JobKind::RemoveMessageLabel { .. } => ("messages", "unlabel"),
        JobKind::MarkMessagesRead { .. } => ("messages", "read"),
        JobKind::MarkMessagesUnread { .. } => ("messages", "unread"),
    };
    ["mail", "v4", resource, action]
}

#[async_trait]
impl JobExecutor for LabelApi {
    async fn execute(&self, user_id: &UserId, kind: &JobKind) -> DataResult<()> {
        if kind.ids().is_empty() {
            return Ok(());
        }
        let path = endpoint(kind);
        debug!("执行任务: {} -> {}, ids={}", kind.name(), path.join("/"), kind.ids().len());
        match kind.label_id() {
            Some(label_id) => self.put_label(user_id, &path, label_id.as_str(), kind.ids()).await,
            None => self.put_ids(user_id, &path, kind.ids()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelId;
    use crate::remote::HttpClientConfig;
    use crate::storage::queue::JobOutcome;

    #[tokio::test]
    async fn blank_label_fails_permanently() {
        let api = Arc::new(ApiClient::new("https://mail.example.com/api", &HttpClientConfig::default()).unwrap());
        let label_api = LabelApi::new(api);
        let kind = JobKind::AddMessageLabel {
            ids: vec!["m1".into()],
            label_id: LabelId::from(" "),
        };
        let result = label_api.execute(&UserId::from("u1"), &kind).await;
        assert!(matches!(JobOutcome::from_result(result), JobOutcome::Failure(_)));
    }

    #[test]
    fn unread_conversation_job_targets_unread_endpoint() {
        let kind = JobKind::MarkConversationsUnread {
            ids: vec!["c1".into()],
            label_id: LabelId::from("0"),
        };
        assert_eq!(endpoint(&kind).join("/"), "mail/v4/conversations/unread");
    }
}
