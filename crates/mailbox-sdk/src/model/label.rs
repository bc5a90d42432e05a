use std::str::FromStr;

use super::LabelId;

/// 系统内置 label（服务端固定 ID）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemLabelId {
    Inbox,
    AllDrafts,
    AllSent,
    Trash,
    Spam,
    AllMail,
    Archive,
    Sent,
    Drafts,
    Outbox,
    Starred,
    AllScheduled,
    AlmostAllMail,
}

impl SystemLabelId {
    pub const ALL: [SystemLabelId; 13] = [
        SystemLabelId::Inbox,
        SystemLabelId::AllDrafts,
        SystemLabelId::AllSent,
        SystemLabelId::Trash,
        SystemLabelId::Spam,
        SystemLabelId::AllMail,
        SystemLabelId::Archive,
        SystemLabelId::Sent,
        SystemLabelId::Drafts,
        SystemLabelId::Outbox,
        SystemLabelId::Starred,
        SystemLabelId::AllScheduled,
        SystemLabelId::AlmostAllMail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemLabelId::Inbox => "0",
            SystemLabelId::AllDrafts => "1",
            SystemLabelId::AllSent => "2",
            SystemLabelId::Trash => "3",
            SystemLabelId::Spam => "4",
            SystemLabelId::AllMail => "5",
            SystemLabelId::Archive => "6",
            SystemLabelId::Sent => "7",
            SystemLabelId::Drafts => "8",
            SystemLabelId::Outbox => "9",
            SystemLabelId::Starred => "10",
            SystemLabelId::AllScheduled => "12",
            SystemLabelId::AlmostAllMail => "15",
        }
    }

    pub fn label_id(&self) -> LabelId {
        LabelId::from(self.as_str())
    }
}

impl FromStr for SystemLabelId {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SystemLabelId::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or(())
    }
}

impl From<SystemLabelId> for LabelId {
    fn from(label: SystemLabelId) -> Self {
        label.label_id()
    }
}
