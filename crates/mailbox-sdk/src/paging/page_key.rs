use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{LabelId, SystemLabelId};

/// 远端接口允许的最大分页大小
pub const MAX_PAGE_SIZE: usize = 150;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    All,
    Read,
    Unread,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::All => "All",
            ReadStatus::Read => "Read",
            ReadStatus::Unread => "Unread",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Read" => ReadStatus::Read,
            "Unread" => ReadStatus::Unread,
            _ => ReadStatus::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderBy {
    Time,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Time => "Time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

/// 分页过滤条件：label、关键字、已读状态以及 (time, order, id) 范围
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageFilter {
    pub label_id: LabelId,
    pub keyword: String,
    pub read: ReadStatus,
    pub min_time: i64,
    pub max_time: i64,
    pub min_order: i64,
    pub max_order: i64,
    pub min_id: Option<String>,
    pub max_id: Option<String>,
}

impl Default for PageFilter {
    fn default() -> Self {
        Self {
            label_id: SystemLabelId::Inbox.label_id(),
            keyword: String::new(),
            read: ReadStatus::All,
            min_time: i64::MIN,
            max_time: i64::MAX,
            min_order: i64::MIN,
            max_order: i64::MAX,
            min_id: None,
            max_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub filter: PageFilter,
    pub order_by: OrderBy,
    pub order_direction: OrderDirection,
    pub size: usize,
}

impl Default for PageKey {
    fn default() -> Self {
        Self {
            filter: PageFilter::default(),
            order_by: OrderBy::Time,
            order_direction: OrderDirection::Descending,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageKey {
    pub fn for_label(label_id: impl Into<LabelId>) -> Self {
        let mut key = Self::default();
        key.filter.label_id = label_id.into();
        key
    }

    pub fn with_direction(mut self, direction: OrderDirection) -> Self {
        self.order_direction = direction;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.filter.keyword = keyword.into();
        self
    }

    pub fn with_read(mut self, read: ReadStatus) -> Self {
        self.filter.read = read;
        self
    }

    /// 大小截断到远端上限
    pub fn clamped(mut self) -> Self {
        self.size = self.size.min(MAX_PAGE_SIZE);
        self
    }

    pub fn min_position(&self) -> Position {
        Position::new(self.filter.min_time, self.filter.min_order)
    }

    pub fn max_position(&self) -> Position {
        Position::new(self.filter.max_time, self.filter.max_order)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "label={} dir={:?} size={} range=[{},{}]",
            self.filter.label_id, self.order_direction, self.size, self.filter.min_time, self.filter.max_time
        )
    }
}

/// 排序位置：先比较 time，再比较 order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub time: i64,
    pub order: i64,
}

impl Position {
    pub fn new(time: i64, order: i64) -> Self {
        Self { time, order }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_targets_inbox_descending() {
        let key = PageKey::default();
        assert_eq!(key.filter.label_id, LabelId::from("0"));
        assert_eq!(key.order_direction, OrderDirection::Descending);
        assert_eq!(key.filter.min_time, i64::MIN);
        assert_eq!(key.filter.max_time, i64::MAX);
    }

    #[test]
    fn clamp_never_exceeds_remote_max() {
        assert_eq!(PageKey::default().with_size(500).clamped().size, MAX_PAGE_SIZE);
        assert_eq!(PageKey::default().with_size(10).clamped().size, 10);
    }

    #[test]
    fn position_orders_by_time_then_order() {
        assert!(Position::new(1, 100) < Position::new(2, 0));
        assert!(Position::new(1, 1) < Position::new(1, 2));
    }
}
