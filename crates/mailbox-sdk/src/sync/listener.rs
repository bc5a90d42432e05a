//! 事件监听器接口
//!
//! 每类实体一个监听器。同一批次内所有监听器的条目在同一个写事务中按 `order()` 升序应用，
//! 同序者保持注册顺序。

use async_trait::async_trait;
use rusqlite::Connection;

use super::envelope::{EventEnvelope, EventItem};
use crate::error::Result;
use crate::events::Table;
use crate::model::UserId;

#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;

    /// 批内应用顺序，数值小的先执行
    fn order(&self) -> u32;

    /// 本监听器写入的表，用于提交后广播
    fn tables(&self) -> &'static [Table];

    /// 从信封中取出本监听器关心的条目；没有则返回 None
    fn deserialize(&self, envelope: &EventEnvelope) -> Option<Vec<EventItem>>;

    /// 在批次事务内应用条目
    fn apply(&self, conn: &Connection, user_id: &UserId, items: &[EventItem]) -> Result<()>;

    /// 缓存不可信时清空并重新拉取
    async fn reset_all(&self, user_id: &UserId) -> Result<()>;
}
