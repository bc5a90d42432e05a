//! 事件游标存储
//!
//! 每个用户一棵 KV 树，键格式：sync_cursor:event

use std::sync::Arc;

use crate::error::Result;
use crate::model::UserId;
use crate::storage::kv::KvStore;

const KEY: &str = "sync_cursor:event";

/// 存储每个用户最后处理完成的事件 ID
#[derive(Clone)]
pub struct EventCursorStore {
    kv: Arc<KvStore>,
}

impl EventCursorStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    pub fn get(&self, user_id: &UserId) -> Result<Option<String>> {
        self.kv.user_tree(user_id)?.get(KEY)
    }

    pub fn set(&self, user_id: &UserId, event_id: &str) -> Result<()> {
        self.kv.user_tree(user_id)?.set(KEY, &event_id)
    }

    pub fn clear(&self, user_id: &UserId) -> Result<()> {
        self.kv.user_tree(user_id)?.remove(KEY)?;
        Ok(())
    }
}
