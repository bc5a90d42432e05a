//! 领域模型 - 会话、消息、未读计数及各类 ID

pub mod conversation;
pub mod label;
pub mod message;
pub mod unread;

pub use conversation::{
    Conversation, ConversationLabel, ConversationWithContext, ConversationWithMessages,
};
pub use label::SystemLabelId;
pub use message::Message;
pub use unread::{CounterKind, UnreadCount, UnreadCounter};

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// 账号 ID，本地所有数据都以它为作用域
    UserId
);
string_id!(ConversationId);
string_id!(MessageId);
string_id!(LabelId);

/// 发件人 / 收件人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Recipient {
    pub address: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl Recipient {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            group: None,
        }
    }
}
