use serde::{Deserialize, Serialize};

use super::{ConversationId, LabelId, MessageId, Recipient, UserId};

/// 消息：只属于一个会话，可同时位于多个 label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub user_id: UserId,
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub order: i64,
    pub subject: String,
    pub unread: bool,
    pub sender: Recipient,
    pub to_list: Vec<Recipient>,
    pub cc_list: Vec<Recipient>,
    pub bcc_list: Vec<Recipient>,
    pub time: i64,
    pub size: i64,
    pub expiration_time: i64,
    pub is_replied: bool,
    pub is_replied_all: bool,
    pub is_forwarded: bool,
    pub address_id: String,
    pub external_id: Option<String>,
    pub num_attachments: i32,
    pub flags: i64,
    pub label_ids: Vec<LabelId>,
}

impl Message {
    pub fn has_label(&self, label_id: &LabelId) -> bool {
        self.label_ids.contains(label_id)
    }

    /// label 列表统一为升序且无重复；所有构造和修改 label 的路径都经过这里
    pub fn normalize_labels(&mut self) {
        self.label_ids.sort();
        self.label_ids.dedup();
    }

    pub fn with_normalized_labels(mut self) -> Self {
        self.normalize_labels();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_labels_sorts_and_dedups() {
        let mut message = crate::storage::dao::test_support::message("m1", "c1", 1, &["5", "0", "5", "10"], false);
        message.normalize_labels();
        let labels: Vec<_> = message.label_ids.iter().map(|l| l.as_str()).collect();
        assert_eq!(labels, vec!["0", "10", "5"]);
        println!("✅ 消息 label 列表规范化");
    }
}
