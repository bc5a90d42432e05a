//! 列表 / 搜索分页的 UI 状态机
//!
//! 输入是分页加载状态快照，输出是离散的列表状态。搜索模式下，下一个状态还取决于当前状态。

use crate::error::DataError;

/// 分页加载失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingError {
    /// 已分类的数据层错误
    Data(DataError),
    /// 非数据层错误（无法归类）
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoading { end_of_pagination_reached: bool },
    Loading,
    Error(PagingError),
}

impl LoadState {
    pub fn idle() -> Self {
        LoadState::NotLoading {
            end_of_pagination_reached: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn error(&self) -> Option<&PagingError> {
        match self {
            LoadState::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for LoadState {
    fn default() -> Self {
        LoadState::idle()
    }
}

/// 单个数据源（本地 source 或远端 mediator）的 refresh / prepend / append 状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadStates {
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
}

/// 合并后的加载状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CombinedLoadStates {
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
    pub source: LoadStates,
    pub mediator: Option<LoadStates>,
}

impl CombinedLoadStates {
    fn source_or_mediator_refreshing(&self) -> bool {
        self.source.refresh.is_loading()
            || self
                .mediator
                .as_ref()
                .map(|m| m.refresh.is_loading())
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PagingSnapshot {
    pub item_count: usize,
    pub load_states: CombinedLoadStates,
}

impl PagingSnapshot {
    fn has_items(&self) -> bool {
        self.item_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailboxListState {
    Loading,
    LoadingWithData,
    Data,
    Empty,
    Error,
    ErrorWithData,
    Offline,
    OfflineWithData,
    UnexpectedError,
    AppendLoading,
    AppendError,
    AppendOfflineError,
    NewSearch,
    SearchLoading,
    SearchLoadingWithData,
    SearchNoData,
    SearchData,
    SearchInputInvalidError,
}

/// 搜索框所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    None,
    NewSearch,
    NewSearchLoading,
    SearchData,
}

/// 普通（非搜索）列表状态映射
pub fn map_to_ui_states(snapshot: &PagingSnapshot) -> MailboxListState {
    let states = &snapshot.load_states;
    let has_items = snapshot.has_items();

    if states.source_or_mediator_refreshing() {
        return if has_items {
            MailboxListState::LoadingWithData
        } else {
            MailboxListState::Loading
        };
    }

    if let Some(error) = states.refresh.error() {
        return refresh_error_state(error, has_items);
    }

    if states.append.is_loading() {
        return MailboxListState::AppendLoading;
    }

    if let Some(error) = states.append.error() {
        return append_error_state(error);
    }

    if has_items {
        MailboxListState::Data
    } else {
        MailboxListState::Empty
    }
}

/// 搜索列表状态映射：新搜索无条件重置，否则按当前状态选择后继规则
pub fn map_to_ui_states_in_search(
    snapshot: &PagingSnapshot,
    search_mode: SearchMode,
    current: MailboxListState,
) -> MailboxListState {
    match search_mode {
        SearchMode::NewSearch => return MailboxListState::NewSearch,
        SearchMode::None => return map_to_ui_states(snapshot),
        SearchMode::NewSearchLoading | SearchMode::SearchData => {}
    }

    if has_input_invalid_error(&snapshot.load_states) {
        return MailboxListState::SearchInputInvalidError;
    }

    match current {
        MailboxListState::SearchLoading => from_search_loading(snapshot),
        MailboxListState::SearchNoData => from_search_no_data(snapshot),
        MailboxListState::SearchData => from_search_data(snapshot),
        MailboxListState::SearchLoadingWithData => from_search_loading_with_data(snapshot),
        _ => from_new_search(snapshot),
    }
}

fn has_input_invalid_error(states: &CombinedLoadStates) -> bool {
    [&states.refresh, &states.prepend, &states.append]
        .into_iter()
        .filter_map(LoadState::error)
        .any(|e| matches!(e, PagingError::Data(d) if d.is_input_invalid()))
}

fn refresh_error_state(error: &PagingError, has_items: bool) -> MailboxListState {
    match error {
        PagingError::Unexpected(_) => MailboxListState::UnexpectedError,
        PagingError::Data(e) if e.is_offline_error() => {
            if has_items {
                MailboxListState::OfflineWithData
            } else {
                MailboxListState::Offline
            }
        }
        PagingError::Data(_) => {
            if has_items {
                MailboxListState::ErrorWithData
            } else {
                MailboxListState::Error
            }
        }
    }
}

fn append_error_state(error: &PagingError) -> MailboxListState {
    match error {
        PagingError::Unexpected(_) => MailboxListState::UnexpectedError,
        PagingError::Data(e) if e.is_offline_error() => MailboxListState::AppendOfflineError,
        PagingError::Data(_) => MailboxListState::AppendError,
    }
}

/// 错误优先：refresh 错误 > append 错误
fn error_state(snapshot: &PagingSnapshot) -> Option<MailboxListState> {
    let states = &snapshot.load_states;
    if let Some(error) = states.refresh.error() {
        return Some(refresh_error_state(error, snapshot.has_items()));
    }
    states.append.error().map(append_error_state)
}

fn settled_state(snapshot: &PagingSnapshot) -> MailboxListState {
    if snapshot.has_items() {
        MailboxListState::SearchData
    } else {
        MailboxListState::SearchNoData
    }
}

/// 新搜索 / 非搜索状态 / 错误状态之后（如配置变更后丢失了当前状态）
fn from_new_search(snapshot: &PagingSnapshot) -> MailboxListState {
    if snapshot.load_states.source_or_mediator_refreshing() {
        return if snapshot.has_items() {
            MailboxListState::SearchLoadingWithData
        } else {
            MailboxListState::SearchLoading
        };
    }
    error_state(snapshot).unwrap_or_else(|| settled_state(snapshot))
}

/// 首次加载：source 与 mediator 都结束后才离开加载态
fn from_search_loading(snapshot: &PagingSnapshot) -> MailboxListState {
    if let Some(state) = error_state(snapshot) {
        return state;
    }
    if snapshot.load_states.source_or_mediator_refreshing() {
        return MailboxListState::SearchLoading;
    }
    settled_state(snapshot)
}

fn from_search_no_data(snapshot: &PagingSnapshot) -> MailboxListState {
    if snapshot.load_states.source_or_mediator_refreshing() {
        return MailboxListState::SearchLoading;
    }
    error_state(snapshot).unwrap_or_else(|| settled_state(snapshot))
}

/// 已展示数据：只看合并后的 refresh，避免闪烁
fn from_search_data(snapshot: &PagingSnapshot) -> MailboxListState {
    let states = &snapshot.load_states;
    if states.refresh.is_loading() && snapshot.has_items() {
        return MailboxListState::SearchLoadingWithData;
    }
    if let Some(error) = states.refresh.error() {
        return refresh_error_state(error, snapshot.has_items());
    }
    if !snapshot.has_items() {
        return MailboxListState::SearchNoData;
    }
    if let Some(error) = states.append.error() {
        return append_error_state(error);
    }
    MailboxListState::SearchData
}

fn from_search_loading_with_data(snapshot: &PagingSnapshot) -> MailboxListState {
    if snapshot.load_states.refresh.is_loading() {
        return MailboxListState::SearchLoadingWithData;
    }
    error_state(snapshot).unwrap_or_else(|| settled_state(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NetworkError, ProtonError, RemoteError};

    fn loading_snapshot(item_count: usize) -> PagingSnapshot {
        PagingSnapshot {
            item_count,
            load_states: CombinedLoadStates {
                refresh: LoadState::Loading,
                source: LoadStates {
                    refresh: LoadState::Loading,
                    ..LoadStates::default()
                },
                mediator: Some(LoadStates {
                    refresh: LoadState::Loading,
                    ..LoadStates::default()
                }),
                ..CombinedLoadStates::default()
            },
        }
    }

    fn idle_snapshot(item_count: usize) -> PagingSnapshot {
        PagingSnapshot {
            item_count,
            load_states: CombinedLoadStates {
                mediator: Some(LoadStates::default()),
                ..CombinedLoadStates::default()
            },
        }
    }

    fn error_snapshot(item_count: usize, refresh: bool, error: DataError) -> PagingSnapshot {
        let mut snapshot = idle_snapshot(item_count);
        if refresh {
            snapshot.load_states.refresh = LoadState::Error(PagingError::Data(error));
        } else {
            snapshot.load_states.append = LoadState::Error(PagingError::Data(error));
        }
        snapshot
    }

    fn server_error() -> DataError {
        DataError::http(NetworkError::ServerError)
    }

    fn input_invalid() -> DataError {
        DataError::Remote(RemoteError::Proton {
            error: ProtonError::InputInvalid,
            api_message: None,
        })
    }

    // ---- 非搜索列表 ----

    #[test]
    fn source_or_mediator_loading() {
        assert_eq!(map_to_ui_states(&loading_snapshot(0)), MailboxListState::Loading);
        assert_eq!(map_to_ui_states(&loading_snapshot(10)), MailboxListState::LoadingWithData);

        let mut mediator_only = idle_snapshot(0);
        mediator_only.load_states.mediator = Some(LoadStates {
            refresh: LoadState::Loading,
            ..LoadStates::default()
        });
        assert_eq!(map_to_ui_states(&mediator_only), MailboxListState::Loading);
    }

    #[test]
    fn refresh_errors() {
        let mut unexpected = idle_snapshot(0);
        unexpected.load_states.refresh = LoadState::Error(PagingError::Unexpected("boom".into()));
        assert_eq!(map_to_ui_states(&unexpected), MailboxListState::UnexpectedError);

        assert_eq!(map_to_ui_states(&error_snapshot(0, true, server_error())), MailboxListState::Error);
        assert_eq!(
            map_to_ui_states(&error_snapshot(10, true, DataError::http(NetworkError::Unreachable))),
            MailboxListState::ErrorWithData
        );
        let offline = DataError::http(NetworkError::NoNetwork);
        assert_eq!(map_to_ui_states(&error_snapshot(0, true, offline.clone())), MailboxListState::Offline);
        assert_eq!(map_to_ui_states(&error_snapshot(10, true, offline)), MailboxListState::OfflineWithData);
    }

    #[test]
    fn append_states() {
        let mut appending = idle_snapshot(10);
        appending.load_states.append = LoadState::Loading;
        assert_eq!(map_to_ui_states(&appending), MailboxListState::AppendLoading);

        let mut unexpected = idle_snapshot(10);
        unexpected.load_states.append = LoadState::Error(PagingError::Unexpected("boom".into()));
        assert_eq!(map_to_ui_states(&unexpected), MailboxListState::UnexpectedError);

        assert_eq!(map_to_ui_states(&error_snapshot(10, false, server_error())), MailboxListState::AppendError);
        assert_eq!(
            map_to_ui_states(&error_snapshot(10, false, DataError::http(NetworkError::NoNetwork))),
            MailboxListState::AppendOfflineError
        );
    }

    #[test]
    fn settled_list() {
        assert_eq!(map_to_ui_states(&idle_snapshot(0)), MailboxListState::Empty);
        assert_eq!(map_to_ui_states(&idle_snapshot(10)), MailboxListState::Data);
    }

    // ---- 搜索 ----

    fn search(snapshot: &PagingSnapshot, current: MailboxListState) -> MailboxListState {
        map_to_ui_states_in_search(snapshot, SearchMode::SearchData, current)
    }

    #[test]
    fn new_search_always_resets() {
        for current in [
            MailboxListState::SearchData,
            MailboxListState::Error,
            MailboxListState::AppendError,
            MailboxListState::Data,
        ] {
            assert_eq!(
                map_to_ui_states_in_search(&loading_snapshot(5), SearchMode::NewSearch, current),
                MailboxListState::NewSearch
            );
        }
    }

    #[test]
    fn from_non_search_state() {
        let current = MailboxListState::Data;
        assert_eq!(
            map_to_ui_states_in_search(&loading_snapshot(0), SearchMode::NewSearchLoading, current),
            MailboxListState::SearchLoading
        );
        assert_eq!(search(&idle_snapshot(0), current), MailboxListState::SearchNoData);
        assert_eq!(search(&loading_snapshot(0), current), MailboxListState::SearchLoading);
        assert_eq!(search(&idle_snapshot(5), current), MailboxListState::SearchData);
        assert_eq!(search(&loading_snapshot(5), current), MailboxListState::SearchLoadingWithData);
    }

    #[test]
    fn input_invalid_wins() {
        let snapshot = error_snapshot(0, false, input_invalid());
        assert_eq!(
            map_to_ui_states_in_search(&snapshot, SearchMode::NewSearchLoading, MailboxListState::SearchLoading),
            MailboxListState::SearchInputInvalidError
        );
        assert_eq!(search(&snapshot, MailboxListState::SearchData), MailboxListState::SearchInputInvalidError);
        assert_eq!(
            search(&snapshot, MailboxListState::SearchLoadingWithData),
            MailboxListState::SearchInputInvalidError
        );
    }

    #[test]
    fn from_new_search() {
        let current = MailboxListState::NewSearch;
        let mode = SearchMode::NewSearchLoading;
        assert_eq!(
            map_to_ui_states_in_search(&loading_snapshot(0), mode, current),
            MailboxListState::SearchLoading
        );
        assert_eq!(
            map_to_ui_states_in_search(&error_snapshot(0, true, server_error()), mode, current),
            MailboxListState::Error
        );
        assert_eq!(
            map_to_ui_states_in_search(&error_snapshot(0, false, server_error()), mode, current),
            MailboxListState::AppendError
        );
    }

    #[test]
    fn from_search_loading() {
        let current = MailboxListState::SearchLoading;
        assert_eq!(search(&loading_snapshot(0), current), MailboxListState::SearchLoading);
        assert_eq!(search(&loading_snapshot(5), current), MailboxListState::SearchLoading);
        assert_eq!(search(&idle_snapshot(0), current), MailboxListState::SearchNoData);
        assert_eq!(search(&idle_snapshot(5), current), MailboxListState::SearchData);
        assert_eq!(search(&error_snapshot(0, true, server_error()), current), MailboxListState::Error);
        assert_eq!(search(&error_snapshot(0, false, server_error()), current), MailboxListState::AppendError);
    }

    #[test]
    fn from_search_no_data() {
        let current = MailboxListState::SearchNoData;
        assert_eq!(search(&loading_snapshot(0), current), MailboxListState::SearchLoading);
        assert_eq!(search(&idle_snapshot(0), current), MailboxListState::SearchNoData);
        assert_eq!(search(&idle_snapshot(5), current), MailboxListState::SearchData);
    }

    #[test]
    fn from_search_data() {
        let current = MailboxListState::SearchData;
        assert_eq!(search(&idle_snapshot(5), current), MailboxListState::SearchData);
        assert_eq!(search(&idle_snapshot(0), current), MailboxListState::SearchNoData);
        assert_eq!(search(&loading_snapshot(5), current), MailboxListState::SearchLoadingWithData);
        assert_eq!(
            search(&error_snapshot(5, true, server_error()), current),
            MailboxListState::ErrorWithData
        );
    }

    #[test]
    fn from_search_loading_with_data() {
        let current = MailboxListState::SearchLoadingWithData;
        assert_eq!(search(&loading_snapshot(0), current), MailboxListState::SearchLoadingWithData);
        assert_eq!(search(&idle_snapshot(0), current), MailboxListState::SearchNoData);
        assert_eq!(search(&idle_snapshot(5), current), MailboxListState::SearchData);
        assert_eq!(search(&error_snapshot(0, true, server_error()), current), MailboxListState::Error);
        assert_eq!(search(&error_snapshot(0, false, server_error()), current), MailboxListState::AppendError);
    }

    #[test]
    fn from_error_states() {
        for current in [MailboxListState::Error, MailboxListState::AppendError] {
            assert_eq!(search(&error_snapshot(0, true, server_error()), current), MailboxListState::Error);
            assert_eq!(search(&error_snapshot(0, false, server_error()), current), MailboxListState::AppendError);
            assert_eq!(
                map_to_ui_states_in_search(&loading_snapshot(0), SearchMode::NewSearchLoading, current),
                MailboxListState::SearchLoading
            );
            assert_eq!(
                map_to_ui_states_in_search(&idle_snapshot(5), SearchMode::NewSearchLoading, current),
                MailboxListState::SearchData
            );
            assert_eq!(
                map_to_ui_states_in_search(&idle_snapshot(0), SearchMode::NewSearchLoading, current),
                MailboxListState::SearchNoData
            );
        }
    }
}
