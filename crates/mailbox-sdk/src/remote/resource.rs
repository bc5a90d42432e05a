//! 服务端 JSON 资源（PascalCase）及其到本地模型的转换

use serde::{Deserialize, Serialize};

use crate::model::{
    Conversation, ConversationId, ConversationLabel, ConversationWithContext, LabelId, Message,
    MessageId, Recipient, UnreadCount, UserId,
};

/// 服务端常以 0/1 表示布尔值
pub(crate) mod int_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrBool {
        Int(i64),
        Bool(bool),
    }

    impl From<IntOrBool> for bool {
        fn from(value: IntOrBool) -> Self {
            match value {
                IntOrBool::Int(i) => i != 0,
                IntOrBool::Bool(b) => b,
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(IntOrBool::deserialize(deserializer)?.into())
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*value as i32)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        Ok(Option::<IntOrBool>::deserialize(deserializer)?.map(Into::into))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationLabelResource {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub context_time: i64,
    #[serde(default)]
    pub context_size: i64,
    #[serde(default)]
    pub context_num_messages: i32,
    #[serde(default)]
    pub context_num_unread: i32,
    #[serde(default)]
    pub context_num_attachments: i32,
}

impl ConversationLabelResource {
    pub fn to_label(&self, conversation_id: &ConversationId) -> ConversationLabel {
        ConversationLabel {
            conversation_id: conversation_id.clone(),
            label_id: LabelId::new(self.id.clone()),
            context_time: self.context_time,
            context_size: self.context_size,
            context_num_messages: self.context_num_messages,
            context_num_unread: self.context_num_unread,
            context_num_attachments: self.context_num_attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationResource {
    #[serde(rename = "ID")]
    pub id: String,
    pub order: i64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub senders: Vec<Recipient>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub num_messages: i32,
    #[serde(default)]
    pub num_unread: i32,
    #[serde(default)]
    pub num_attachments: i32,
    #[serde(default)]
    pub expiration_time: i64,
    #[serde(default)]
    pub labels: Vec<ConversationLabelResource>,
}

impl ConversationResource {
    pub fn to_conversation(&self, user_id: &UserId) -> Conversation {
        let conversation_id = ConversationId::new(self.id.clone());
        Conversation {
            user_id: user_id.clone(),
            labels: self.labels.iter().map(|l| l.to_label(&conversation_id)).collect(),
            conversation_id,
            order: self.order,
            subject: self.subject.clone(),
            senders: self.senders.clone(),
            recipients: self.recipients.clone(),
            expiration_time: self.expiration_time,
            num_messages: self.num_messages,
            num_unread: self.num_unread,
            num_attachments: self.num_attachments,
        }
    }

    pub fn to_conversation_with_context(&self, user_id: &UserId, context_label_id: &LabelId) -> ConversationWithContext {
        ConversationWithContext {
            conversation: self.to_conversation(user_id),
            context_label_id: context_label_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageResource {
    #[serde(rename = "ID")]
    pub id: String,
    pub order: i64,
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(with = "int_bool")]
    pub unread: bool,
    #[serde(default)]
    pub sender: Recipient,
    #[serde(default)]
    pub to_list: Vec<Recipient>,
    #[serde(default, rename = "CCList")]
    pub cc_list: Vec<Recipient>,
    #[serde(default, rename = "BCCList")]
    pub bcc_list: Vec<Recipient>,
    pub time: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub expiration_time: i64,
    #[serde(default, with = "int_bool")]
    pub is_replied: bool,
    #[serde(default, with = "int_bool")]
    pub is_replied_all: bool,
    #[serde(default, with = "int_bool")]
    pub is_forwarded: bool,
    #[serde(default, rename = "AddressID")]
    pub address_id: String,
    #[serde(default, rename = "LabelIDs")]
    pub label_ids: Vec<String>,
    #[serde(default, rename = "ExternalID")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub num_attachments: i32,
    #[serde(default)]
    pub flags: i64,
}

impl MessageResource {
    pub fn to_message(&self, user_id: &UserId) -> Message {
        Message {
            user_id: user_id.clone(),
            message_id: MessageId::new(self.id.clone()),
            conversation_id: ConversationId::new(self.conversation_id.clone()),
            order: self.order,
            subject: self.subject.clone(),
            unread: self.unread,
            sender: self.sender.clone(),
            to_list: self.to_list.clone(),
            cc_list: self.cc_list.clone(),
            bcc_list: self.bcc_list.clone(),
            time: self.time,
            size: self.size,
            expiration_time: self.expiration_time,
            is_replied: self.is_replied,
            is_replied_all: self.is_replied_all,
            is_forwarded: self.is_forwarded,
            address_id: self.address_id.clone(),
            external_id: self.external_id.clone(),
            num_attachments: self.num_attachments,
            flags: self.flags,
            label_ids: self.label_ids.iter().map(|id| LabelId::new(id.clone())).collect(),
        }
        .with_normalized_labels()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnreadCountResource {
    #[serde(rename = "LabelID")]
    pub label_id: String,
    #[serde(default)]
    pub total: i32,
    #[serde(default)]
    pub unread: i32,
}

impl From<&UnreadCountResource> for UnreadCount {
    fn from(resource: &UnreadCountResource) -> Self {
        UnreadCount {
            label_id: LabelId::new(resource.label_id.clone()),
            total: resource.total,
            unread: resource.unread,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationsResponse {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub conversations: Vec<ConversationResource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversationResponse {
    pub conversation: ConversationResource,
    #[serde(default)]
    pub messages: Vec<MessageResource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessagesResponse {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub messages: Vec<MessageResource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageResponse {
    pub message: MessageResource,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CountsResponse {
    #[serde(default)]
    pub counts: Vec<UnreadCountResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestEventResponse {
    #[serde(rename = "EventID")]
    pub event_id: String,
}

/// 仅关心业务码的响应
#[derive(Debug, Clone, Deserialize)]
pub struct CodeResponse {
    #[serde(rename = "Code", default)]
    pub code: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelIdsBody<'a> {
    #[serde(rename = "LabelID")]
    pub label_id: &'a str,
    #[serde(rename = "IDs")]
    pub ids: &'a [String],
}

#[derive(Debug, Clone, Serialize)]
pub struct IdsBody<'a> {
    #[serde(rename = "IDs")]
    pub ids: &'a [String],
}
