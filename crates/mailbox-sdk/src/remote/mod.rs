//! 远端数据源：列表 / 详情读取直接走 HTTP，变更操作只入队，由 LabelApi 在后台执行

pub mod api;
pub mod conversation;
pub mod event;
pub mod label_api;
pub mod message;
pub mod resource;
#[cfg(test)]
pub(crate) mod test_support;
pub mod unread;

pub use api::{ApiClient, HttpClientConfig, Session};
pub use conversation::{ApiConversationRemoteDataSource, ConversationRemoteDataSource};
pub use event::{ApiEventRemoteDataSource, EventRemoteDataSource};
pub use label_api::LabelApi;
pub use message::{ApiMessageRemoteDataSource, MessageRemoteDataSource};
pub use unread::{ApiUnreadCountRemoteDataSource, UnreadCountRemoteDataSource};

use crate::paging::{OrderDirection, PageKey, ReadStatus, MAX_PAGE_SIZE};

/// 列表查询参数。
///
/// # Panics
/// `page_key.size` 超过 [`MAX_PAGE_SIZE`] 时直接 panic，调用方需先裁剪。
pub fn page_query(page_key: &PageKey) -> Vec<(&'static str, String)> {
    assert!(
        page_key.size <= MAX_PAGE_SIZE,
        "page size {} exceeds remote maximum {}",
        page_key.size,
        MAX_PAGE_SIZE
    );

    let filter = &page_key.filter;
    let mut query = vec![
        ("Page", "0".to_string()),
        ("PageSize", page_key.size.to_string()),
        ("Limit", page_key.size.to_string()),
        ("LabelID", filter.label_id.to_string()),
        ("Sort", page_key.order_by.as_str().to_string()),
        (
            "Desc",
            match page_key.order_direction {
                OrderDirection::Ascending => "0",
                OrderDirection::Descending => "1",
            }
            .to_string(),
        ),
    ];

    if filter.min_time != i64::MIN {
        query.push(("Begin", filter.min_time.to_string()));
    }
    if let Some(id) = &filter.min_id {
        query.push(("BeginID", id.clone()));
    }
    if filter.max_time != i64::MAX {
        query.push(("End", filter.max_time.to_string()));
    }
    if let Some(id) = &filter.max_id {
        query.push(("EndID", id.clone()));
    }
    if !filter.keyword.trim().is_empty() {
        query.push(("Keyword", filter.keyword.clone()));
    }
    match filter.read {
        ReadStatus::All => {}
        ReadStatus::Read => query.push(("Unread", "0".to_string())),
        ReadStatus::Unread => query.push(("Unread", "1".to_string())),
    }
    query
}
