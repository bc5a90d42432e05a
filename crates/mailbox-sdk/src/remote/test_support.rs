//! 远端数据源的测试替身：返回预设结果并记录调用

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ConversationRemoteDataSource, EventRemoteDataSource, MessageRemoteDataSource, UnreadCountRemoteDataSource};
use crate::error::{DataError, DataResult, Result};
use crate::model::{
    ConversationId, ConversationWithContext, ConversationWithMessages, LabelId, Message, MessageId, UnreadCount,
    UserId,
};
use crate::paging::PageKey;
use crate::sync::EventEnvelope;

/// 入队记录：(操作, 实体 ID, label)
pub type Enqueued = (&'static str, Vec<String>, Vec<String>);

fn raw<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

pub struct FakeConversationRemote {
    pub page: Mutex<DataResult<Vec<ConversationWithContext>>>,
    pub detail: Mutex<DataResult<ConversationWithMessages>>,
    pub detail_delay: Duration,
    pub page_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub last_page_size: AtomicUsize,
    pub enqueued: Mutex<Vec<Enqueued>>,
}

impl Default for FakeConversationRemote {
    fn default() -> Self {
        Self {
            page: Mutex::new(Ok(Vec::new())),
            detail: Mutex::new(Err(DataError::no_data_cached())),
            detail_delay: Duration::ZERO,
            page_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            last_page_size: AtomicUsize::new(0),
            enqueued: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConversationRemoteDataSource for FakeConversationRemote {
    async fn get_conversations(&self, _user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<ConversationWithContext>> {
        let _ = super::page_query(page_key);
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.last_page_size.store(page_key.size, Ordering::SeqCst);
        self.page.lock().clone()
    }

    async fn get_conversation_with_messages(
        &self,
        _user_id: &UserId,
        _conversation_id: &ConversationId,
    ) -> DataResult<ConversationWithMessages> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if !self.detail_delay.is_zero() {
            tokio::time::sleep(self.detail_delay).await;
        }
        self.detail.lock().clone()
    }

    fn add_labels_to_conversations(&self, _user_id: &UserId, ids: &[ConversationId], label_ids: &[LabelId]) -> Result<()> {
        self.enqueued.lock().push(("add_labels", raw(ids), raw(label_ids)));
        Ok(())
    }

    fn remove_labels_from_conversations(
        &self,
        _user_id: &UserId,
        ids: &[ConversationId],
        label_ids: &[LabelId],
    ) -> Result<()> {
        self.enqueued.lock().push(("remove_labels", raw(ids), raw(label_ids)));
        Ok(())
    }

    fn mark_read(&self, _user_id: &UserId, ids: &[ConversationId]) -> Result<()> {
        self.enqueued.lock().push(("mark_read", raw(ids), Vec::new()));
        Ok(())
    }

    fn mark_unread(&self, _user_id: &UserId, ids: &[ConversationId], context_label_id: &LabelId) -> Result<()> {
        self.enqueued
            .lock()
            .push(("mark_unread", raw(ids), vec![context_label_id.to_string()]));
        Ok(())
    }
}

pub struct FakeMessageRemote {
    pub page: Mutex<DataResult<Vec<Message>>>,
    pub detail: Mutex<DataResult<Message>>,
    pub page_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub enqueued: Mutex<Vec<Enqueued>>,
}

impl Default for FakeMessageRemote {
    fn default() -> Self {
        Self {
            page: Mutex::new(Ok(Vec::new())),
            detail: Mutex::new(Err(DataError::no_data_cached())),
            page_calls: AtomicUsize::new(0),
            detail_calls: AtomicUsize::new(0),
            enqueued: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageRemoteDataSource for FakeMessageRemote {
    async fn get_messages(&self, _user_id: &UserId, page_key: &PageKey) -> DataResult<Vec<Message>> {
        let _ = super::page_query(page_key);
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.page.lock().clone()
    }

    async fn get_message(&self, _user_id: &UserId, _message_id: &MessageId) -> DataResult<Message> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.detail.lock().clone()
    }

    fn add_labels_to_messages(&self, _user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()> {
        self.enqueued.lock().push(("add_labels", raw(ids), raw(label_ids)));
        Ok(())
    }

    fn remove_labels_from_messages(&self, _user_id: &UserId, ids: &[MessageId], label_ids: &[LabelId]) -> Result<()> {
        self.enqueued.lock().push(("remove_labels", raw(ids), raw(label_ids)));
        Ok(())
    }

    fn mark_read(&self, _user_id: &UserId, ids: &[MessageId]) -> Result<()> {
        self.enqueued.lock().push(("mark_read", raw(ids), Vec::new()));
        Ok(())
    }

    fn mark_unread(&self, _user_id: &UserId, ids: &[MessageId]) -> Result<()> {
        self.enqueued.lock().push(("mark_unread", raw(ids), Vec::new()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeUnreadRemote {
    pub messages: Mutex<Vec<UnreadCount>>,
    pub conversations: Mutex<Vec<UnreadCount>>,
    /// 设置后两个接口都返回该错误
    pub failure: Mutex<Option<DataError>>,
    pub calls: AtomicUsize,
}

impl FakeUnreadRemote {
    fn respond(&self, counters: &Mutex<Vec<UnreadCount>>) -> DataResult<Vec<UnreadCount>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(counters.lock().clone()),
        }
    }
}

#[async_trait]
impl UnreadCountRemoteDataSource for FakeUnreadRemote {
    async fn get_message_counters(&self, _user_id: &UserId) -> DataResult<Vec<UnreadCount>> {
        self.respond(&self.messages)
    }

    async fn get_conversation_counters(&self, _user_id: &UserId) -> DataResult<Vec<UnreadCount>> {
        self.respond(&self.conversations)
    }
}

/// 按顺序吐出预设的事件批次
pub struct FakeEventRemote {
    pub latest: String,
    pub batches: Mutex<VecDeque<EventEnvelope>>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeEventRemote {
    pub fn new(latest: &str, batches: Vec<EventEnvelope>) -> Self {
        Self {
            latest: latest.to_string(),
            batches: Mutex::new(batches.into()),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventRemoteDataSource for FakeEventRemote {
    async fn get_latest_event_id(&self, _user_id: &UserId) -> DataResult<String> {
        Ok(self.latest.clone())
    }

    async fn get_events(&self, _user_id: &UserId, since: &str) -> DataResult<EventEnvelope> {
        self.requested.lock().push(since.to_string());
        Ok(self
            .batches
            .lock()
            .pop_front()
            .unwrap_or_else(|| EventEnvelope::empty(since)))
    }
}
