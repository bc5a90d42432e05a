//! 会话 label 上下文数据访问

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::placeholders;
use crate::error::Result;
use crate::model::{ConversationId, ConversationLabel, LabelId, UserId};

pub struct ConversationLabelDao<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationLabelDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_or_update(&self, user_id: &UserId, label: &ConversationLabel) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conversation_label (
                user_id, conversation_id, label_id, context_time, context_size,
                context_num_messages, context_num_unread, context_num_attachments
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, conversation_id, label_id) DO UPDATE SET
                context_time = excluded.context_time,
                context_size = excluded.context_size,
                context_num_messages = excluded.context_num_messages,
                context_num_unread = excluded.context_num_unread,
                context_num_attachments = excluded.context_num_attachments",
            params![
                user_id.as_str(),
                label.conversation_id.as_str(),
                label.label_id.as_str(),
                label.context_time,
                label.context_size,
                label.context_num_messages,
                label.context_num_unread,
                label.context_num_attachments,
            ],
        )?;
        Ok(())
    }

    pub fn get_for_conversation(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ConversationLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM conversation_label
             WHERE user_id = ?1 AND conversation_id = ?2
             ORDER BY label_id",
        )?;
        let rows = stmt.query_map(params![user_id.as_str(), conversation_id.as_str()], |row| {
            Self::row_to_label(row)
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 删除会话的全部 label 行（重写 label 集合前调用）
    pub fn delete_all(&self, user_id: &UserId, conversation_ids: &[ConversationId]) -> Result<usize> {
        if conversation_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM conversation_label WHERE user_id = ?1 AND conversation_id IN ({})",
            placeholders(2, conversation_ids.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(conversation_ids.iter().map(|id| Value::from(id.0.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    /// 带有该 label 的会话 ID
    pub fn conversation_ids_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<Vec<ConversationId>> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id FROM conversation_label WHERE user_id = ?1 AND label_id = ?2",
        )?;
        let rows = stmt.query_map(params![user_id.as_str(), label_id.as_str()], |row| {
            Ok(ConversationId(row.get(0)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn row_to_label(row: &Row<'_>) -> rusqlite::Result<ConversationLabel> {
        Ok(ConversationLabel {
            conversation_id: ConversationId(row.get("conversation_id")?),
            label_id: LabelId(row.get("label_id")?),
            context_time: row.get("context_time")?,
            context_size: row.get("context_size")?,
            context_num_messages: row.get("context_num_messages")?,
            context_num_unread: row.get("context_num_unread")?,
            context_num_attachments: row.get("context_num_attachments")?,
        })
    }
}
