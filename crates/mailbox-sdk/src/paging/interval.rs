//! 分页区间：记录哪些 (time, order) 范围已经完整地从服务端拉取到本地
//!
//! - 写入一页后生成区间，并与所有重叠 / 相接的已有区间合并
//! - 读取时据此判断本地页是否可信，以及远端请求可以裁剪到哪一段

use serde::{Deserialize, Serialize};

use super::page_key::{OrderBy, OrderDirection, PageKey, Position, ReadStatus};
use crate::model::{ConversationWithContext, LabelId, Message};

/// 区间所属的列表类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageItemType {
    Conversation,
    Message,
}

impl PageItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageItemType::Conversation => "Conversation",
            PageItemType::Message => "Message",
        }
    }
}

/// 可分页的列表项
pub trait PageItem {
    fn page_time(&self) -> i64;
    fn page_order(&self) -> i64;
    fn page_id(&self) -> &str;

    fn position(&self) -> Position {
        Position::new(self.page_time(), self.page_order())
    }
}

impl PageItem for ConversationWithContext {
    fn page_time(&self) -> i64 {
        self.context_time()
    }

    fn page_order(&self) -> i64 {
        self.conversation.order
    }

    fn page_id(&self) -> &str {
        self.conversation.conversation_id.as_str()
    }
}

impl PageItem for Message {
    fn page_time(&self) -> i64 {
        self.time
    }

    fn page_order(&self) -> i64 {
        self.order
    }

    fn page_id(&self) -> &str {
        self.message_id.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInterval {
    pub item_type: PageItemType,
    pub order_by: OrderBy,
    pub label_id: LabelId,
    pub keyword: String,
    pub read: ReadStatus,
    pub min_value: i64,
    pub max_value: i64,
    pub min_order: i64,
    pub max_order: i64,
    pub min_id: Option<String>,
    pub max_id: Option<String>,
}

impl PageInterval {
    pub fn min_position(&self) -> Position {
        Position::new(self.min_value, self.min_order)
    }

    pub fn max_position(&self) -> Position {
        Position::new(self.max_value, self.max_order)
    }

    pub fn contains(&self, position: Position) -> bool {
        self.min_position() <= position && position <= self.max_position()
    }

    /// 重叠或首尾相接
    pub fn overlaps(&self, other: &PageInterval) -> bool {
        self.min_position() <= other.max_position() && other.min_position() <= self.max_position()
    }
}

/// 区间端点（值、次序、ID）
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    value: i64,
    order: i64,
    id: Option<String>,
}

impl Bound {
    fn position(&self) -> Position {
        Position::new(self.value, self.order)
    }

    fn of_item<T: PageItem>(item: &T) -> Self {
        Self {
            value: item.page_time(),
            order: item.page_order(),
            id: Some(item.page_id().to_string()),
        }
    }
}

/// 由一页结果生成区间。
///
/// 结果不足一页说明已到达 key 的边界；满页则以最后一项为边界。
pub fn interval_for_page<T: PageItem>(
    item_type: PageItemType,
    page_key: &PageKey,
    items: &[T],
) -> PageInterval {
    let filter = &page_key.filter;
    let key_min = Bound {
        value: filter.min_time,
        order: filter.min_order,
        id: filter.min_id.clone(),
    };
    let key_max = Bound {
        value: filter.max_time,
        order: filter.max_order,
        id: filter.max_id.clone(),
    };
    let last = if items.len() < page_key.size {
        None
    } else {
        items.last().map(Bound::of_item)
    };

    let (min, max) = match page_key.order_direction {
        OrderDirection::Ascending => (key_min, last.unwrap_or(key_max)),
        OrderDirection::Descending => (last.unwrap_or(key_min), key_max),
    };

    PageInterval {
        item_type,
        order_by: page_key.order_by,
        label_id: filter.label_id.clone(),
        keyword: filter.keyword.clone(),
        read: filter.read,
        min_value: min.value,
        max_value: max.value,
        min_order: min.order,
        max_order: max.order,
        min_id: min.id,
        max_id: max.id,
    }
}

/// 合并结果：需要删除的旧区间 + 合并后的新区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub absorbed: Vec<PageInterval>,
    pub merged: PageInterval,
}

/// 把所有与新区间重叠或相接的已有区间并入新区间
pub fn merge_intervals(existing: &[PageInterval], new: PageInterval) -> MergeOutcome {
    let absorbed: Vec<PageInterval> = existing
        .iter()
        .filter(|interval| interval.overlaps(&new))
        .cloned()
        .collect();

    let mut min = Bound {
        value: new.min_value,
        order: new.min_order,
        id: new.min_id.clone(),
    };
    let mut max = Bound {
        value: new.max_value,
        order: new.max_order,
        id: new.max_id.clone(),
    };
    for interval in &absorbed {
        if interval.min_position() < min.position() {
            min = Bound {
                value: interval.min_value,
                order: interval.min_order,
                id: interval.min_id.clone(),
            };
        }
        if interval.max_position() > max.position() {
            max = Bound {
                value: interval.max_value,
                order: interval.max_order,
                id: interval.max_id.clone(),
            };
        }
    }

    let merged = PageInterval {
        min_value: min.value,
        max_value: max.value,
        min_order: min.order,
        max_order: max.order,
        min_id: min.id,
        max_id: max.id,
        ..new
    };
    MergeOutcome { absorbed, merged }
}

/// 本地页是否可直接使用。
///
/// - 无区间：不可信
/// - 无数据：某个区间完整覆盖 key 的范围
/// - 有数据：首尾两项落在同一个区间内
pub fn is_local_page_valid<T: PageItem>(
    intervals: &[PageInterval],
    page_key: &PageKey,
    items: &[T],
) -> bool {
    if intervals.is_empty() {
        return false;
    }

    if items.is_empty() {
        let (min, max) = (page_key.min_position(), page_key.max_position());
        return intervals
            .iter()
            .any(|interval| interval.contains(min) && interval.contains(max));
    }

    let (first, last) = items.iter().fold((None, None), |(lo, hi): (Option<Position>, Option<Position>), item| {
        let p = item.position();
        (
            Some(lo.map_or(p, |lo| lo.min(p))),
            Some(hi.map_or(p, |hi| hi.max(p))),
        )
    });
    match (first, last) {
        (Some(first), Some(last)) => intervals
            .iter()
            .any(|interval| interval.contains(first) && interval.contains(last)),
        _ => false,
    }
}

/// 去掉 key 中本地已完整覆盖的部分。
///
/// 返回 None 表示整个范围都已在本地，无需请求远端。
pub fn clipped_page_key(intervals: &[PageInterval], page_key: &PageKey) -> Option<PageKey> {
    let min_interval = intervals
        .iter()
        .find(|interval| interval.contains(page_key.min_position()));
    let max_interval = intervals
        .iter()
        .find(|interval| interval.contains(page_key.max_position()));

    if let (Some(a), Some(b)) = (min_interval, max_interval) {
        if a == b {
            return None;
        }
    }

    let mut clipped = page_key.clone();
    if let Some(interval) = min_interval {
        clipped.filter.min_time = interval.max_value;
        clipped.filter.min_order = interval.max_order;
        clipped.filter.min_id = interval.max_id.clone();
    }
    if let Some(interval) = max_interval {
        clipped.filter.max_time = interval.min_value;
        clipped.filter.max_order = interval.min_order;
        clipped.filter.max_id = interval.min_id.clone();
    }
    Some(clipped)
}
