//! 发件箱数据访问层 - 正在发送的消息 ID，缓存重置时需保留

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::model::{MessageId, UserId};

pub struct OutboxDao<'a> {
    conn: &'a Connection,
}

impl<'a> OutboxDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn add(&self, user_id: &UserId, message_id: &MessageId, created_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO outbox (user_id, message_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id.as_str(), message_id.as_str(), created_at],
        )?;
        Ok(())
    }

    pub fn remove(&self, user_id: &UserId, message_id: &MessageId) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM outbox WHERE user_id = ?1 AND message_id = ?2",
            params![user_id.as_str(), message_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn all_ids(&self, user_id: &UserId) -> Result<Vec<MessageId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT message_id FROM outbox WHERE user_id = ?1 ORDER BY created_at, message_id")?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| Ok(MessageId(row.get(0)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
