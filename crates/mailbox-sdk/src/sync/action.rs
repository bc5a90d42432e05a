use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

/// 事件动作码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum EventAction {
    Delete = 0,
    Create = 1,
    Update = 2,
    Partial = 3,
}

impl EventAction {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(EventAction::Delete),
            1 => Some(EventAction::Create),
            2 => Some(EventAction::Update),
            3 => Some(EventAction::Partial),
            _ => None,
        }
    }
}

impl TryFrom<i32> for EventAction {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        EventAction::from_i32(value).ok_or_else(|| format!("unknown event action: {}", value))
    }
}

impl From<EventAction> for i32 {
    fn from(action: EventAction) -> Self {
        action as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_codes() {
        assert_eq!(EventAction::from_i32(0), Some(EventAction::Delete));
        assert_eq!(EventAction::from_i32(3), Some(EventAction::Partial));
        assert_eq!(EventAction::from_i32(7), None);
        assert_eq!(serde_json::from_str::<EventAction>("2").unwrap(), EventAction::Update);
        assert!(serde_json::from_str::<EventAction>("9").is_err());
    }
}
