use serde::{Deserialize, Serialize};

use super::{ConversationId, LabelId, Message, Recipient, UserId};

/// 会话在某个 label 下的上下文数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLabel {
    pub conversation_id: ConversationId,
    pub label_id: LabelId,
    pub context_time: i64,
    pub context_size: i64,
    pub context_num_messages: i32,
    pub context_num_unread: i32,
    pub context_num_attachments: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub order: i64,
    pub labels: Vec<ConversationLabel>,
    pub subject: String,
    pub senders: Vec<Recipient>,
    pub recipients: Vec<Recipient>,
    pub expiration_time: i64,
    pub num_messages: i32,
    pub num_unread: i32,
    pub num_attachments: i32,
}

impl Conversation {
    pub fn label(&self, label_id: &LabelId) -> Option<&ConversationLabel> {
        self.labels.iter().find(|l| &l.label_id == label_id)
    }

    pub fn has_label(&self, label_id: &LabelId) -> bool {
        self.label(label_id).is_some()
    }

    pub fn label_ids(&self) -> Vec<LabelId> {
        self.labels.iter().map(|l| l.label_id.clone()).collect()
    }

    /// 所有 label 中最新的上下文时间
    pub fn latest_context_time(&self) -> i64 {
        self.labels.iter().map(|l| l.context_time).max().unwrap_or_default()
    }
}

/// 会话详情：会话本身及其全部消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWithMessages {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// 分页列表项：会话 + 当前列表所在 label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWithContext {
    pub conversation: Conversation,
    pub context_label_id: LabelId,
}

impl ConversationWithContext {
    pub fn context(&self) -> Option<&ConversationLabel> {
        self.conversation.label(&self.context_label_id)
    }

    pub fn context_time(&self) -> i64 {
        self.context().map(|l| l.context_time).unwrap_or_default()
    }
}
