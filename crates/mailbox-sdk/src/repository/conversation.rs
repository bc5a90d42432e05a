//! 会话仓库：先读缓存，页面无效时拉取远端；标签变更先落本地再入队远端任务
//!
//! 本地变更不会因远端失败而回滚。远端任务持久化在队列中重试，直到成功或永久失败，
//! 永久失败后以服务端事件为准纠正本地状态。

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::{debug, info, warn};

use super::store::{cached_with_refresh, map_local, SharedFlights, SingleFlight};
use crate::error::{DataError, DataResult};
use crate::local::{ConversationLocalDataSource, MessageLocalDataSource};
use crate::model::{
    Conversation, ConversationId, ConversationWithContext, LabelId, Message, MessageId, UserId,
};
use crate::paging::PageKey;
use crate::remote::ConversationRemoteDataSource;

/// 标签集合尚未满足「全部添加 / 全部移除」的消息
pub fn messages_needing_change(messages: &[Message], add: &[LabelId], remove: &[LabelId]) -> Vec<MessageId> {
    messages
        .iter()
        .filter(|m| add.iter().any(|l| !m.has_label(l)) || remove.iter().any(|l| m.has_label(l)))
        .map(|m| m.message_id.clone())
        .collect()
}

pub struct ConversationRepository {
    local: Arc<dyn ConversationLocalDataSource>,
    messages: Arc<dyn MessageLocalDataSource>,
    remote: Arc<dyn ConversationRemoteDataSource>,
    flights: SharedFlights<(UserId, ConversationId)>,
}

impl ConversationRepository {
    pub fn new(
        local: Arc<dyn ConversationLocalDataSource>,
        messages: Arc<dyn MessageLocalDataSource>,
        remote: Arc<dyn ConversationRemoteDataSource>,
    ) -> Self {
        Self {
            local,
            messages,
            remote,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    /// 读取一页会话。本地页有效时不访问远端；远端失败时返回本地已有数据
    pub async fn get_conversations(&self, user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<ConversationWithContext>> {
        let page_key = page_key.clone().clamped();
        let local_items = self.local.get_conversations(user_id, &page_key).await?;
        if self.local.is_local_page_valid(user_id, &page_key, &local_items).await? {
            debug!("会话页命中缓存: user={}, label={}", user_id, page_key.filter.label_id);
            return Ok(local_items);
        }

        let Some(fetch_key) = self.local.get_clipped_page_key(user_id, &page_key).await? else {
            return Ok(local_items);
        };
        match self.remote.get_conversations(user_id, &fetch_key).await {
            Ok(remote_items) => {
                self.local.upsert_conversations(user_id, &fetch_key, remote_items).await?;
                Ok(self.local.get_conversations(user_id, &page_key).await?)
            }
            Err(e) => {
                warn!("⚠️ 拉取会话页失败，返回缓存: user={}, error={}", user_id, e);
                Ok(local_items)
            }
        }
    }

    /// 观察单个会话。每次订阅都会刷新一次远端数据（同 key 并发只请求一次）
    pub fn observe_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> BoxStream<'static, DataResult<Conversation>> {
        let cache = self.local.observe_conversation(user_id, conversation_id);
        let refresh = Self::refresh(
            self.flights.clone(),
            self.local.clone(),
            self.messages.clone(),
            self.remote.clone(),
            user_id.clone(),
            conversation_id.clone(),
        );
        cached_with_refresh(cache, refresh)
    }

    async fn refresh(
        flights: SharedFlights<(UserId, ConversationId)>,
        local: Arc<dyn ConversationLocalDataSource>,
        messages: Arc<dyn MessageLocalDataSource>,
        remote: Arc<dyn ConversationRemoteDataSource>,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> DataResult<()> {
        let key = (user_id.clone(), conversation_id.clone());
        flights
            .run(key, move || async move {
                let detail = remote.get_conversation_with_messages(&user_id, &conversation_id).await?;
                local.upsert_conversation(&user_id, detail.conversation).await?;
                messages.upsert_message_list(&user_id, detail.messages).await?;
                debug!("会话已刷新: user={}, conversation={}", user_id, conversation_id);
                Ok(())
            })
            .await
    }

    pub fn observe_cached_conversations(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
    ) -> BoxStream<'static, DataResult<Vec<Conversation>>> {
        map_local(self.local.observe_cached_conversations(user_id, ids))
    }

    pub async fn add_label(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        label_id: &LabelId,
    ) -> DataResult<Conversation> {
        let updated = self
            .add_labels(user_id, std::slice::from_ref(conversation_id), std::slice::from_ref(label_id))
            .await?;
        updated.into_iter().next().ok_or_else(DataError::no_data_cached)
    }

    pub async fn add_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> DataResult<Vec<Conversation>> {
        self.relabel(user_id, ids, label_ids, &[]).await
    }

    pub async fn remove_label(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
        label_id: &LabelId,
    ) -> DataResult<Conversation> {
        let updated = self
            .remove_labels(user_id, std::slice::from_ref(conversation_id), std::slice::from_ref(label_id))
            .await?;
        updated.into_iter().next().ok_or_else(DataError::no_data_cached)
    }

    pub async fn remove_labels(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> DataResult<Vec<Conversation>> {
        self.relabel(user_id, ids, &[], label_ids).await
    }

    /// 本地会话 → 需要变更的消息 → 远端任务入队
    pub async fn relabel(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        label_ids_to_add: &[LabelId],
        label_ids_to_remove: &[LabelId],
    ) -> DataResult<Vec<Conversation>> {
        let conversations = self
            .local
            .relabel(user_id, ids, label_ids_to_add, label_ids_to_remove)
            .await?;

        let messages = self.messages.get_messages_in_conversation(user_id, ids).await?;
        let affected = messages_needing_change(&messages, label_ids_to_add, label_ids_to_remove);
        if !affected.is_empty() {
            self.messages
                .relabel_messages(user_id, &affected, label_ids_to_add, label_ids_to_remove)
                .await?;
        }

        if !label_ids_to_add.is_empty() {
            self.remote.add_labels_to_conversations(user_id, ids, label_ids_to_add)?;
        }
        if !label_ids_to_remove.is_empty() {
            self.remote.remove_labels_from_conversations(user_id, ids, label_ids_to_remove)?;
        }
        info!(
            "会话标签已变更: user={}, conversations={}, messages={}, add={:?}, remove={:?}",
            user_id,
            conversations.len(),
            affected.len(),
            label_ids_to_add,
            label_ids_to_remove
        );
        Ok(conversations)
    }

    /// 会话及其未读消息标记为已读
    pub async fn mark_read(&self, user_id: &UserId, ids: &[ConversationId]) -> DataResult<Vec<Conversation>> {
        let conversations = self.local.mark_read(user_id, ids).await?;
        let unread: Vec<MessageId> = self
            .messages
            .get_messages_in_conversation(user_id, ids)
            .await?
            .into_iter()
            .filter(|m| m.unread)
            .map(|m| m.message_id)
            .collect();
        if !unread.is_empty() {
            self.messages.mark_read(user_id, &unread).await?;
        }
        self.remote.mark_read(user_id, ids)?;
        Ok(conversations)
    }

    /// 会话标记为未读，并把该 label 下最近一封已读消息标记为未读
    pub async fn mark_unread(
        &self,
        user_id: &UserId,
        ids: &[ConversationId],
        context_label_id: &LabelId,
    ) -> DataResult<Vec<Conversation>> {
        let conversations = self.local.mark_unread(user_id, ids, context_label_id).await?;
        let messages = self.messages.get_messages_in_conversation(user_id, ids).await?;
        let latest_read: Vec<MessageId> = ids
            .iter()
            .filter_map(|id| {
                messages
                    .iter()
                    .filter(|m| &m.conversation_id == id && !m.unread && m.has_label(context_label_id))
                    .max_by_key(|m| (m.time, m.order))
                    .map(|m| m.message_id.clone())
            })
            .collect();
        if !latest_read.is_empty() {
            self.messages.mark_unread(user_id, &latest_read).await?;
        }
        self.remote.mark_unread(user_id, ids, context_label_id)?;
        Ok(conversations)
    }

    pub async fn mark_as_stale(&self, user_id: &UserId, label_id: &LabelId) -> DataResult<()> {
        self.local.mark_as_stale(user_id, label_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::local::{SqliteConversationLocalDataSource, SqliteMessageLocalDataSource};
    use crate::model::ConversationWithMessages;
    use crate::remote::test_support::FakeConversationRemote;
    use crate::storage::dao::test_support::{conversation, message};
    use crate::storage::StorageManager;
    use futures::StreamExt;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        local: Arc<SqliteConversationLocalDataSource>,
        messages: Arc<SqliteMessageLocalDataSource>,
        remote: Arc<FakeConversationRemote>,
        repository: ConversationRepository,
        user: UserId,
    }

    async fn fixture(remote: FakeConversationRemote) -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = StorageManager::open(dir.path(), 64).await.unwrap();
        let user = UserId::from("u1");
        storage.init_user(&user).await.unwrap();
        let local = Arc::new(SqliteConversationLocalDataSource::new(storage.clone()));
        let messages = Arc::new(SqliteMessageLocalDataSource::new(storage));
        let remote = Arc::new(remote);
        let repository = ConversationRepository::new(local.clone(), messages.clone(), remote.clone());
        Fixture {
            _dir: dir,
            local,
            messages,
            remote,
            repository,
            user,
        }
    }

    fn in_inbox(id: &str, time: i64) -> ConversationWithContext {
        ConversationWithContext {
            conversation: conversation(id, &[("0", time)], 1),
            context_label_id: LabelId::from("0"),
        }
    }

    #[test]
    fn only_messages_missing_the_change_are_selected() {
        let messages = vec![
            message("m1", "c1", 1, &["0", "10"], false),
            message("m2", "c1", 2, &["0"], false),
        ];
        assert_eq!(
            messages_needing_change(&messages, &[LabelId::from("10")], &[]),
            vec![MessageId::from("m2")]
        );
        assert_eq!(
            messages_needing_change(&messages, &[], &[LabelId::from("10")]),
            vec![MessageId::from("m1")]
        );
        assert!(messages_needing_change(&messages, &[LabelId::from("0")], &[]).is_empty());
    }

    #[tokio::test]
    async fn valid_local_page_skips_remote() {
        let f = fixture(FakeConversationRemote::default()).await;
        let key = PageKey::default();
        f.local
            .upsert_conversations(&f.user, &key, vec![in_inbox("c1", 100), in_inbox("c2", 90)])
            .await
            .unwrap();

        let page = f.repository.get_conversations(&f.user, &key).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(f.remote.page_calls.load(Ordering::SeqCst), 0);
        println!("✅ 有效的本地页不访问远端");
    }

    #[tokio::test]
    async fn invalid_page_fetches_clamped_key_and_persists() {
        let f = fixture(FakeConversationRemote::default()).await;
        *f.remote.page.lock() = Ok(vec![in_inbox("c1", 100)]);

        let key = PageKey::default().with_size(500);
        let page = f.repository.get_conversations(&f.user, &key).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(f.remote.page_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.remote.last_page_size.load(Ordering::SeqCst), 150);

        // 远端结果已写入并记录区间，再次读取命中缓存
        f.repository.get_conversations(&f.user, &key).await.unwrap();
        assert_eq!(f.remote.page_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_cache() {
        let f = fixture(FakeConversationRemote::default()).await;
        f.local
            .upsert_conversation_list(&f.user, vec![conversation("c1", &[("0", 100)], 1)])
            .await
            .unwrap();
        *f.remote.page.lock() = Err(DataError::http(NetworkError::NoNetwork));

        let page = f.repository.get_conversations(&f.user, &PageKey::default()).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(f.remote.page_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observe_fetches_once_for_concurrent_observers() {
        let remote = FakeConversationRemote {
            detail_delay: Duration::from_millis(50),
            ..Default::default()
        };
        let f = fixture(remote).await;
        *f.remote.detail.lock() = Ok(ConversationWithMessages {
            conversation: conversation("c1", &[("0", 100)], 1),
            messages: vec![message("m1", "c1", 100, &["0"], true)],
        });

        let id = ConversationId::from("c1");
        let mut first = f.repository.observe_conversation(&f.user, &id);
        let mut second = f.repository.observe_conversation(&f.user, &id);
        let (a, b) = tokio::join!(first.next(), second.next());

        assert_eq!(a.unwrap().unwrap().conversation_id, id);
        assert_eq!(b.unwrap().unwrap().conversation_id, id);
        assert_eq!(f.remote.detail_calls.load(Ordering::SeqCst), 1);
        assert!(f.messages.get_message(&f.user, &"m1".into()).await.unwrap().is_some());
        println!("✅ 并发观察只拉取一次远端");
    }

    #[tokio::test]
    async fn observe_without_cache_surfaces_remote_error() {
        let f = fixture(FakeConversationRemote::default()).await;
        *f.remote.detail.lock() = Err(DataError::http(NetworkError::NoNetwork));

        let mut observed = f.repository.observe_conversation(&f.user, &"c1".into());
        let error = observed.next().await.unwrap().unwrap_err();
        assert!(error.is_offline_error());
    }

    #[tokio::test]
    async fn add_label_updates_conversation_messages_and_enqueues() {
        let f = fixture(FakeConversationRemote::default()).await;
        f.local
            .upsert_conversation_list(&f.user, vec![conversation("c1", &[("0", 100)], 1)])
            .await
            .unwrap();
        f.messages
            .upsert_message_list(
                &f.user,
                vec![
                    message("m1", "c1", 90, &["0", "10"], false),
                    message("m2", "c1", 100, &["0"], true),
                ],
            )
            .await
            .unwrap();

        let starred = LabelId::from("10");
        let updated = f
            .repository
            .add_label(&f.user, &"c1".into(), &starred)
            .await
            .unwrap();
        assert!(updated.has_label(&starred));

        let m2 = f.messages.get_message(&f.user, &"m2".into()).await.unwrap().unwrap();
        assert!(m2.has_label(&starred));
        let enqueued = f.remote.enqueued.lock().clone();
        assert_eq!(enqueued, vec![("add_labels", vec!["c1".to_string()], vec!["10".to_string()])]);
    }

    #[tokio::test]
    async fn add_label_without_cache_is_no_data_cached() {
        let f = fixture(FakeConversationRemote::default()).await;
        let result = f
            .repository
            .add_label(&f.user, &"missing".into(), &LabelId::from("10"))
            .await;
        assert_eq!(result.unwrap_err(), DataError::no_data_cached());
        assert!(f.remote.enqueued.lock().is_empty());
    }

    #[tokio::test]
    async fn mark_unread_marks_latest_read_message_in_label() {
        let f = fixture(FakeConversationRemote::default()).await;
        f.local
            .upsert_conversation_list(&f.user, vec![conversation("c1", &[("0", 100)], 0)])
            .await
            .unwrap();
        f.messages
            .upsert_message_list(
                &f.user,
                vec![
                    message("old", "c1", 50, &["0"], false),
                    message("latest", "c1", 100, &["0"], false),
                    message("archived", "c1", 200, &["6"], false),
                ],
            )
            .await
            .unwrap();

        f.repository
            .mark_unread(&f.user, &["c1".into()], &LabelId::from("0"))
            .await
            .unwrap();

        let latest = f.messages.get_message(&f.user, &"latest".into()).await.unwrap().unwrap();
        let old = f.messages.get_message(&f.user, &"old".into()).await.unwrap().unwrap();
        let archived = f.messages.get_message(&f.user, &"archived".into()).await.unwrap().unwrap();
        assert!(latest.unread);
        assert!(!old.unread);
        assert!(!archived.unread);
        assert_eq!(f.remote.enqueued.lock()[0].0, "mark_unread");
    }
}
