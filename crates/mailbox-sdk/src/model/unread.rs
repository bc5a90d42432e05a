use serde::{Deserialize, Serialize};

use super::LabelId;

/// 某个 label 下的总数 / 未读数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounter {
    pub label_id: LabelId,
    pub count: i32,
}

/// 计数对象：消息或会话
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Messages,
    Conversations,
}

/// 服务端下发的原始计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub label_id: LabelId,
    pub total: i32,
    pub unread: i32,
}

impl From<&UnreadCount> for UnreadCounter {
    fn from(count: &UnreadCount) -> Self {
        Self {
            label_id: count.label_id.clone(),
            count: count.unread,
        }
    }
}
