//! 分页：page key、已拉取区间，以及列表 / 搜索 UI 状态机

pub mod interval;
pub mod page_key;
pub mod state;

pub use interval::{
    clipped_page_key, interval_for_page, is_local_page_valid, merge_intervals, PageInterval,
    PageItem, PageItemType,
};
pub use page_key::{
    OrderBy, OrderDirection, PageFilter, PageKey, Position, ReadStatus, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use state::{
    map_to_ui_states, map_to_ui_states_in_search, CombinedLoadStates, LoadState, LoadStates,
    MailboxListState, PagingError, PagingSnapshot, SearchMode,
};
