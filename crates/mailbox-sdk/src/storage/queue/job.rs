//! 持久化任务：一次需要同步到服务端的本地变更意图

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DataError, RemoteError};
use crate::model::{LabelId, UserId};

/// 单个任务携带的最大 ID 数
pub const MAX_IDS_PER_JOB: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobKind {
    AddConversationLabel { ids: Vec<String>, label_id: LabelId },
    RemoveConversationLabel { ids: Vec<String>, label_id: LabelId },
    MarkConversationsRead { ids: Vec<String> },
    MarkConversationsUnread { ids: Vec<String>, label_id: LabelId },
    AddMessageLabel { ids: Vec<String>, label_id: LabelId },
    RemoveMessageLabel { ids: Vec<String>, label_id: LabelId },
    MarkMessagesRead { ids: Vec<String> },
    MarkMessagesUnread { ids: Vec<String> },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::AddConversationLabel { .. } => "add_conversation_label",
            JobKind::RemoveConversationLabel { .. } => "remove_conversation_label",
            JobKind::MarkConversationsRead { .. } => "mark_conversations_read",
            JobKind::MarkConversationsUnread { .. } => "mark_conversations_unread",
            JobKind::AddMessageLabel { .. } => "add_message_label",
            JobKind::RemoveMessageLabel { .. } => "remove_message_label",
            JobKind::MarkMessagesRead { .. } => "mark_messages_read",
            JobKind::MarkMessagesUnread { .. } => "mark_messages_unread",
        }
    }

    pub fn ids(&self) -> &[String] {
        match self {
            JobKind::AddConversationLabel { ids, .. }
            | JobKind::RemoveConversationLabel { ids, .. }
            | JobKind::MarkConversationsRead { ids }
            | JobKind::MarkConversationsUnread { ids, .. }
            | JobKind::AddMessageLabel { ids, .. }
            | JobKind::RemoveMessageLabel { ids, .. }
            | JobKind::MarkMessagesRead { ids }
            | JobKind::MarkMessagesUnread { ids } => ids,
        }
    }

    pub fn label_id(&self) -> Option<&LabelId> {
        match self {
            JobKind::AddConversationLabel { label_id, .. }
            | JobKind::RemoveConversationLabel { label_id, .. }
            | JobKind::MarkConversationsUnread { label_id, .. }
            | JobKind::AddMessageLabel { label_id, .. }
            | JobKind::RemoveMessageLabel { label_id, .. } => Some(label_id),
            _ => None,
        }
    }

    /// 用另一组 ID 构造同类任务（用于分块）
    pub fn with_ids(&self, ids: Vec<String>) -> Self {
        match self {
            JobKind::AddConversationLabel { label_id, .. } => JobKind::AddConversationLabel {
                ids,
                label_id: label_id.clone(),
            },
            JobKind::RemoveConversationLabel { label_id, .. } => JobKind::RemoveConversationLabel {
                ids,
                label_id: label_id.clone(),
            },
            JobKind::MarkConversationsRead { .. } => JobKind::MarkConversationsRead { ids },
            JobKind::MarkConversationsUnread { label_id, .. } => JobKind::MarkConversationsUnread {
                ids,
                label_id: label_id.clone(),
            },
            JobKind::AddMessageLabel { label_id, .. } => JobKind::AddMessageLabel {
                ids,
                label_id: label_id.clone(),
            },
            JobKind::RemoveMessageLabel { label_id, .. } => JobKind::RemoveMessageLabel {
                ids,
                label_id: label_id.clone(),
            },
            JobKind::MarkMessagesRead { .. } => JobKind::MarkMessagesRead { ids },
            JobKind::MarkMessagesUnread { .. } => JobKind::MarkMessagesUnread { ids },
        }
    }

    /// 按 MAX_IDS_PER_JOB 拆分
    pub fn chunked(&self) -> Vec<JobKind> {
        self.ids()
            .chunks(MAX_IDS_PER_JOB)
            .map(|chunk| self.with_ids(chunk.to_vec()))
            .collect()
    }

    pub fn is_conversation_job(&self) -> bool {
        matches!(
            self,
            JobKind::AddConversationLabel { .. }
                | JobKind::RemoveConversationLabel { .. }
                | JobKind::MarkConversationsRead { .. }
                | JobKind::MarkConversationsUnread { .. }
        )
    }

    fn target(&self) -> JobTarget<'_> {
        match self {
            JobKind::AddConversationLabel { label_id, .. } | JobKind::RemoveConversationLabel { label_id, .. } => {
                JobTarget::ConversationLabel(label_id)
            }
            JobKind::MarkConversationsRead { .. } | JobKind::MarkConversationsUnread { .. } => {
                JobTarget::ConversationRead
            }
            JobKind::AddMessageLabel { label_id, .. } | JobKind::RemoveMessageLabel { label_id, .. } => {
                JobTarget::MessageLabel(label_id)
            }
            JobKind::MarkMessagesRead { .. } | JobKind::MarkMessagesUnread { .. } => JobTarget::MessageRead,
        }
    }

    /// 同一目标（同一 label 的增删，或已读 / 未读）上，后入队的任务覆盖先入队的
    pub fn supersedes(&self, earlier: &JobKind) -> bool {
        self.target() == earlier.target()
    }
}

/// 任务作用的目标状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobTarget<'a> {
    ConversationLabel(&'a LabelId),
    ConversationRead,
    MessageLabel(&'a LabelId),
    MessageRead,
}

/// (用户, 是否会话, 实体 ID)
pub type EntityKey = (UserId, bool, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: UserId,
    pub kind: JobKind,
    pub attempts: u32,
    pub next_attempt_at: i64,
    pub created_at: i64,
    pub last_error: Option<String>,
    /// 入队序号，决定执行顺序；同 ID 任务重新入队后序号更新
    #[serde(default)]
    pub seq: u64,
}

impl Job {
    pub fn new(user_id: UserId, kind: JobKind, now_ms: i64) -> Self {
        Self {
            id: Self::job_id(&user_id, &kind),
            user_id,
            kind,
            attempts: 0,
            next_attempt_at: now_ms,
            created_at: now_ms,
            last_error: None,
            seq: 0,
        }
    }

    pub fn entity_keys(&self) -> Vec<EntityKey> {
        let conversation = self.kind.is_conversation_job();
        self.kind
            .ids()
            .iter()
            .map(|id| (self.user_id.clone(), conversation, id.clone()))
            .collect()
    }

    /// 由 (类型, 用户, ID 列表, label) 计算的确定性 ID
    pub fn job_id(user_id: &UserId, kind: &JobKind) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(user_id.as_str().as_bytes());
        for id in kind.ids() {
            hasher.update([0u8]);
            hasher.update(id.as_bytes());
        }
        if let Some(label_id) = kind.label_id() {
            hasher.update([1u8]);
            hasher.update(label_id.as_str().as_bytes());
        }
        hex::encode(&hasher.finalize()[..16])
    }
}

/// 一次执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// 连接类错误，稍后重试
    Retry(String),
    /// 解析 / 校验类错误，不再重试
    Failure(String),
}

impl JobOutcome {
    pub fn from_result(result: std::result::Result<(), DataError>) -> Self {
        match result {
            Ok(()) => JobOutcome::Success,
            Err(DataError::Remote(RemoteError::Http(network))) if network.is_connectivity() => {
                JobOutcome::Retry(format!("{:?}", network))
            }
            Err(e) => JobOutcome::Failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LocalError, NetworkError};

    #[test]
    fn job_id_is_deterministic() {
        let user = UserId::from("u1");
        let kind = JobKind::AddConversationLabel {
            ids: vec!["c1".into(), "c2".into()],
            label_id: LabelId::from("10"),
        };
        assert_eq!(Job::job_id(&user, &kind), Job::job_id(&user, &kind.clone()));

        let other_label = JobKind::AddConversationLabel {
            ids: vec!["c1".into(), "c2".into()],
            label_id: LabelId::from("6"),
        };
        assert_ne!(Job::job_id(&user, &kind), Job::job_id(&user, &other_label));
        assert_ne!(Job::job_id(&user, &kind), Job::job_id(&UserId::from("u2"), &kind));
    }

    #[test]
    fn supersedes_only_on_same_target() {
        let ids = vec!["c1".to_string()];
        let add = JobKind::AddConversationLabel {
            ids: ids.clone(),
            label_id: LabelId::from("10"),
        };
        let remove = JobKind::RemoveConversationLabel {
            ids: ids.clone(),
            label_id: LabelId::from("10"),
        };
        let other_label = JobKind::AddConversationLabel {
            ids: ids.clone(),
            label_id: LabelId::from("6"),
        };
        let read = JobKind::MarkConversationsRead { ids: ids.clone() };
        let unread = JobKind::MarkConversationsUnread {
            ids: ids.clone(),
            label_id: LabelId::from("0"),
        };

        assert!(remove.supersedes(&add));
        assert!(add.supersedes(&remove));
        assert!(!other_label.supersedes(&add));
        assert!(unread.supersedes(&read));
        assert!(!read.supersedes(&add));
        assert!(!JobKind::MarkMessagesRead { ids }.supersedes(&read));
    }

    #[test]
    fn chunks_at_one_hundred_ids() {
        let ids: Vec<String> = (0..250).map(|i| format!("m{}", i)).collect();
        let chunks = JobKind::MarkMessagesRead { ids }.chunked();
        let sizes: Vec<usize> = chunks.iter().map(|k| k.ids().len()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn outcome_classification() {
        assert_eq!(JobOutcome::from_result(Ok(())), JobOutcome::Success);
        for network in [NetworkError::NoNetwork, NetworkError::Unreachable, NetworkError::ServerError] {
            assert!(matches!(
                JobOutcome::from_result(Err(DataError::http(network))),
                JobOutcome::Retry(_)
            ));
        }
        assert!(matches!(
            JobOutcome::from_result(Err(DataError::http(NetworkError::Parse))),
            JobOutcome::Failure(_)
        ));
        assert!(matches!(
            JobOutcome::from_result(Err(DataError::Local(LocalError::Unknown("x".into())))),
            JobOutcome::Failure(_)
        ));
        println!("✅ 任务结果分类正确");
    }
}
