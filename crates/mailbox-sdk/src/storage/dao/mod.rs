//! 数据访问层 (DAO) - 每张表一个操作模块
//!
//! DAO 只借用 `&Connection`，既可在单条调用中使用，也可在事务（`&Transaction` 解引用）中组合使用。

pub mod conversation;
pub mod conversation_label;
pub mod message;
pub mod outbox;
pub mod page_interval;
pub mod unread_count;

pub use conversation::ConversationDao;
pub use conversation_label::ConversationLabelDao;
pub use message::MessageDao;
pub use outbox::OutboxDao;
pub use page_interval::PageIntervalDao;
pub use unread_count::UnreadCountDao;

use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// 序列化为 JSON 文本列
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// 读取 JSON 文本列
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// 生成 `?N, ?N+1, ...` 占位符
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// LIKE 关键字模式
pub(crate) fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(3, 3), "?3, ?4, ?5");
        assert_eq!(placeholders(1, 0), "");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
