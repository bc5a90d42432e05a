//! 事件信封及其条目的解码
//!
//! 条目的载荷先按原始 JSON 保留，由各监听器按动作码解码为完整资源或局部补丁。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::action::EventAction;
use crate::model::{
    Conversation, ConversationId, LabelId, Message, MessageId, Recipient, UnreadCount,
};
use crate::remote::resource::{
    int_bool, ConversationLabelResource, ConversationResource, MessageResource, UnreadCountResource,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationEvent {
    #[serde(rename = "ID")]
    pub id: String,
    pub action: EventAction,
    #[serde(default)]
    pub conversation: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageEvent {
    #[serde(rename = "ID")]
    pub id: String,
    pub action: EventAction,
    #[serde(default)]
    pub message: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventEnvelope {
    #[serde(rename = "EventID")]
    pub event_id: String,
    #[serde(default, with = "int_bool")]
    pub more: bool,
    #[serde(default, with = "int_bool")]
    pub refresh: bool,
    #[serde(default)]
    pub conversations: Option<Vec<ConversationEvent>>,
    #[serde(default)]
    pub messages: Option<Vec<MessageEvent>>,
    #[serde(default)]
    pub message_counts: Option<Vec<UnreadCountResource>>,
    #[serde(default)]
    pub conversation_counts: Option<Vec<UnreadCountResource>>,
}

impl EventEnvelope {
    pub fn empty(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            more: false,
            refresh: false,
            conversations: None,
            messages: None,
            message_counts: None,
            conversation_counts: None,
        }
    }
}

/// 单个实体的变更
#[derive(Debug, Clone, PartialEq)]
pub enum EntityChange<F, P> {
    Delete,
    Create(F),
    Update(F),
    /// 局部更新；载荷恰好也是完整资源时一并保留，供本地无记录时整条写入
    Partial { patch: P, full: Option<F> },
}

/// 监听器解码后的条目
#[derive(Debug, Clone, PartialEq)]
pub enum EventItem {
    Conversation {
        id: ConversationId,
        change: EntityChange<ConversationResource, ConversationPatch>,
    },
    Message {
        id: MessageId,
        change: EntityChange<MessageResource, MessagePatch>,
    },
    MessageCount(UnreadCount),
    ConversationCount(UnreadCount),
}

/// 按动作码解码载荷；无法解码的条目跳过
pub(crate) fn decode_change<F, P>(id: &str, action: EventAction, payload: Option<&Value>) -> Option<EntityChange<F, P>>
where
    F: serde::de::DeserializeOwned,
    P: serde::de::DeserializeOwned,
{
    if action == EventAction::Delete {
        return Some(EntityChange::Delete);
    }
    let Some(payload) = payload else {
        warn!("⚠️ 事件缺少载荷: id={}, action={:?}", id, action);
        return None;
    };
    let full = || serde_json::from_value::<F>(payload.clone());
    match action {
        EventAction::Create | EventAction::Update => match full() {
            Ok(resource) if action == EventAction::Create => Some(EntityChange::Create(resource)),
            Ok(resource) => Some(EntityChange::Update(resource)),
            Err(e) => {
                warn!("⚠️ 事件载荷解码失败: id={}, error={}", id, e);
                None
            }
        },
        EventAction::Partial => match serde_json::from_value::<P>(payload.clone()) {
            Ok(patch) => Some(EntityChange::Partial {
                patch,
                full: full().ok(),
            }),
            Err(e) => {
                warn!("⚠️ 局部事件解码失败: id={}, error={}", id, e);
                None
            }
        },
        EventAction::Delete => Some(EntityChange::Delete),
    }
}

/// 会话局部更新：缺失字段保持本地值
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationPatch {
    pub order: Option<i64>,
    pub subject: Option<String>,
    pub senders: Option<Vec<Recipient>>,
    pub recipients: Option<Vec<Recipient>>,
    pub num_messages: Option<i32>,
    pub num_unread: Option<i32>,
    pub num_attachments: Option<i32>,
    pub expiration_time: Option<i64>,
    pub labels: Option<Vec<ConversationLabelResource>>,
}

impl ConversationPatch {
    pub fn apply_to(&self, mut conversation: Conversation) -> Conversation {
        if let Some(order) = self.order {
            conversation.order = order;
        }
        if let Some(subject) = &self.subject {
            conversation.subject = subject.clone();
        }
        if let Some(senders) = &self.senders {
            conversation.senders = senders.clone();
        }
        if let Some(recipients) = &self.recipients {
            conversation.recipients = recipients.clone();
        }
        if let Some(n) = self.num_messages {
            conversation.num_messages = n;
        }
        if let Some(n) = self.num_unread {
            conversation.num_unread = n;
        }
        if let Some(n) = self.num_attachments {
            conversation.num_attachments = n;
        }
        if let Some(t) = self.expiration_time {
            conversation.expiration_time = t;
        }
        if let Some(labels) = &self.labels {
            let id = conversation.conversation_id.clone();
            conversation.labels = labels.iter().map(|l| l.to_label(&id)).collect();
        }
        conversation
    }
}

/// 消息局部更新；支持 LabelIDsAdded / LabelIDsRemoved 增量
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagePatch {
    pub order: Option<i64>,
    #[serde(rename = "ConversationID")]
    pub conversation_id: Option<String>,
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "int_bool::deserialize_option")]
    pub unread: Option<bool>,
    pub sender: Option<Recipient>,
    pub to_list: Option<Vec<Recipient>>,
    #[serde(rename = "CCList")]
    pub cc_list: Option<Vec<Recipient>>,
    #[serde(rename = "BCCList")]
    pub bcc_list: Option<Vec<Recipient>>,
    pub time: Option<i64>,
    pub size: Option<i64>,
    pub expiration_time: Option<i64>,
    #[serde(default, deserialize_with = "int_bool::deserialize_option")]
    pub is_replied: Option<bool>,
    #[serde(default, deserialize_with = "int_bool::deserialize_option")]
    pub is_replied_all: Option<bool>,
    #[serde(default, deserialize_with = "int_bool::deserialize_option")]
    pub is_forwarded: Option<bool>,
    #[serde(rename = "AddressID")]
    pub address_id: Option<String>,
    #[serde(rename = "ExternalID")]
    pub external_id: Option<String>,
    pub num_attachments: Option<i32>,
    pub flags: Option<i64>,
    #[serde(rename = "LabelIDs")]
    pub label_ids: Option<Vec<String>>,
    #[serde(rename = "LabelIDsAdded")]
    pub label_ids_added: Option<Vec<String>>,
    #[serde(rename = "LabelIDsRemoved")]
    pub label_ids_removed: Option<Vec<String>>,
}

impl MessagePatch {
    pub fn apply_to(&self, mut message: Message) -> Message {
        if let Some(order) = self.order {
            message.order = order;
        }
        if let Some(id) = &self.conversation_id {
            message.conversation_id = ConversationId::new(id.clone());
        }
        if let Some(subject) = &self.subject {
            message.subject = subject.clone();
        }
        if let Some(unread) = self.unread {
            message.unread = unread;
        }
        if let Some(sender) = &self.sender {
            message.sender = sender.clone();
        }
        if let Some(list) = &self.to_list {
            message.to_list = list.clone();
        }
        if let Some(list) = &self.cc_list {
            message.cc_list = list.clone();
        }
        if let Some(list) = &self.bcc_list {
            message.bcc_list = list.clone();
        }
        if let Some(time) = self.time {
            message.time = time;
        }
        if let Some(size) = self.size {
            message.size = size;
        }
        if let Some(t) = self.expiration_time {
            message.expiration_time = t;
        }
        if let Some(v) = self.is_replied {
            message.is_replied = v;
        }
        if let Some(v) = self.is_replied_all {
            message.is_replied_all = v;
        }
        if let Some(v) = self.is_forwarded {
            message.is_forwarded = v;
        }
        if let Some(id) = &self.address_id {
            message.address_id = id.clone();
        }
        if let Some(id) = &self.external_id {
            message.external_id = Some(id.clone());
        }
        if let Some(n) = self.num_attachments {
            message.num_attachments = n;
        }
        if let Some(flags) = self.flags {
            message.flags = flags;
        }

        if let Some(ids) = &self.label_ids {
            message.label_ids = ids.iter().map(|id| LabelId::new(id.clone())).collect();
        }
        if let Some(removed) = &self.label_ids_removed {
            message.label_ids.retain(|label| !removed.iter().any(|r| r == label.as_str()));
        }
        if let Some(added) = &self.label_ids_added {
            message.label_ids.extend(added.iter().map(|id| LabelId::new(id.clone())));
        }
        message.with_normalized_labels()
    }
}
