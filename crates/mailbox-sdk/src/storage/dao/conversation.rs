//! 会话数据访问层 - 会话行 + label 上下文行

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{json_column, like_pattern, placeholders, to_json, ConversationLabelDao};
use crate::error::Result;
use crate::model::{Conversation, ConversationId, ConversationWithContext, LabelId, UserId};
use crate::paging::{OrderDirection, PageKey, ReadStatus};

/// 会话数据访问对象
pub struct ConversationDao<'a> {
    conn: &'a Connection,
}

impl<'a> ConversationDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 写入会话行并整体替换其 label 集合
    pub fn upsert(&self, conversation: &Conversation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO conversation (
                user_id, conversation_id, sort_order, subject, senders, recipients,
                expiration_time, num_messages, num_unread, num_attachments
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(user_id, conversation_id) DO UPDATE SET
                sort_order = excluded.sort_order,
                subject = excluded.subject,
                senders = excluded.senders,
                recipients = excluded.recipients,
                expiration_time = excluded.expiration_time,
                num_messages = excluded.num_messages,
                num_unread = excluded.num_unread,
                num_attachments = excluded.num_attachments",
            params![
                conversation.user_id.as_str(),
                conversation.conversation_id.as_str(),
                conversation.order,
                conversation.subject,
                to_json(&conversation.senders)?,
                to_json(&conversation.recipients)?,
                conversation.expiration_time,
                conversation.num_messages,
                conversation.num_unread,
                conversation.num_attachments,
            ],
        )?;

        let labels = ConversationLabelDao::new(self.conn);
        labels.delete_all(&conversation.user_id, std::slice::from_ref(&conversation.conversation_id))?;
        for label in &conversation.labels {
            labels.insert_or_update(&conversation.user_id, label)?;
        }
        Ok(())
    }

    pub fn get(&self, user_id: &UserId, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM conversation WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id.as_str(), conversation_id.as_str()],
                |row| Self::row_to_conversation(row),
            )
            .optional()?;
        match row {
            Some(conversation) => Ok(Some(self.with_labels(conversation)?)),
            None => Ok(None),
        }
    }

    pub fn get_many(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Conversation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM conversation WHERE user_id = ?1 AND conversation_id IN ({})",
            placeholders(2, ids.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(ids.iter().map(|id| Value::from(id.0.clone())));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| Self::row_to_conversation(row))?;
        let conversations = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        conversations.into_iter().map(|c| self.with_labels(c)).collect()
    }

    pub fn get_all_ids(&self, user_id: &UserId) -> Result<Vec<ConversationId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT conversation_id FROM conversation WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| Ok(ConversationId(row.get(0)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 分页查询：label + 关键字 + 已读过滤 + (context_time, order) 闭区间
    pub fn get_page(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<ConversationWithContext>> {
        let filter = &page_key.filter;
        let direction = match page_key.order_direction {
            OrderDirection::Ascending => "ASC",
            OrderDirection::Descending => "DESC",
        };
        let read_clause = match filter.read {
            ReadStatus::All => "",
            ReadStatus::Read => "AND cl.context_num_unread = 0",
            ReadStatus::Unread => "AND cl.context_num_unread > 0",
        };
        let sql = format!(
            "SELECT c.* FROM conversation c
             JOIN conversation_label cl
               ON cl.user_id = c.user_id AND cl.conversation_id = c.conversation_id
             WHERE c.user_id = ?1 AND cl.label_id = ?2
               AND (?3 = '' OR c.subject LIKE ?4 ESCAPE '\\' OR c.senders LIKE ?4 ESCAPE '\\'
                    OR c.recipients LIKE ?4 ESCAPE '\\')
               {read}
               AND (cl.context_time > ?5 OR (cl.context_time = ?5 AND c.sort_order >= ?6))
               AND (cl.context_time < ?7 OR (cl.context_time = ?7 AND c.sort_order <= ?8))
             ORDER BY cl.context_time {dir}, c.sort_order {dir}, c.conversation_id {dir}
             LIMIT ?9",
            read = read_clause,
            dir = direction
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                user_id.as_str(),
                filter.label_id.as_str(),
                filter.keyword,
                like_pattern(&filter.keyword),
                filter.min_time,
                filter.min_order,
                filter.max_time,
                filter.max_order,
                page_key.size as i64,
            ],
            |row| Self::row_to_conversation(row),
        )?;
        let conversations = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        conversations
            .into_iter()
            .map(|c| {
                Ok(ConversationWithContext {
                    conversation: self.with_labels(c)?,
                    context_label_id: filter.label_id.clone(),
                })
            })
            .collect()
    }

    pub fn delete(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM conversation WHERE user_id = ?1 AND conversation_id IN ({})",
            placeholders(2, ids.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(ids.iter().map(|id| Value::from(id.0.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn delete_all(&self, user_id: &UserId) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM conversation WHERE user_id = ?1", params![user_id.as_str()])?)
    }

    /// 删除除 keep 之外的全部会话
    pub fn delete_all_except(&self, user_id: &UserId, keep: &[ConversationId]) -> Result<usize> {
        if keep.is_empty() {
            return self.delete_all(user_id);
        }
        let sql = format!(
            "DELETE FROM conversation WHERE user_id = ?1 AND conversation_id NOT IN ({})",
            placeholders(2, keep.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(keep.iter().map(|id| Value::from(id.0.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn delete_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<usize> {
        let ids = ConversationLabelDao::new(self.conn).conversation_ids_with_label(user_id, label_id)?;
        self.delete(user_id, &ids)
    }

    fn with_labels(&self, mut conversation: Conversation) -> Result<Conversation> {
        conversation.labels = ConversationLabelDao::new(self.conn)
            .get_for_conversation(&conversation.user_id, &conversation.conversation_id)?;
        Ok(conversation)
    }

    fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
        Ok(Conversation {
            user_id: UserId(row.get("user_id")?),
            conversation_id: ConversationId(row.get("conversation_id")?),
            order: row.get("sort_order")?,
            labels: Vec::new(),
            subject: row.get("subject")?,
            senders: json_column(row, "senders")?,
            recipients: json_column(row, "recipients")?,
            expiration_time: row.get("expiration_time")?,
            num_messages: row.get("num_messages")?,
            num_unread: row.get("num_unread")?,
            num_attachments: row.get("num_attachments")?,
        })
    }
}
