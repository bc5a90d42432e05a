//! 消息数据访问层 - 消息行 + 扁平 label 集合

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{json_column, like_pattern, placeholders, to_json};
use crate::error::Result;
use crate::model::{ConversationId, LabelId, Message, MessageId, UserId};
use crate::paging::{OrderDirection, PageKey, ReadStatus};

pub struct MessageDao<'a> {
    conn: &'a Connection,
}

impl<'a> MessageDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 写入消息行并整体替换其 label 集合
    pub fn upsert(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT INTO message (
                user_id, message_id, conversation_id, sort_order, subject, unread, sender,
                to_list, cc_list, bcc_list, time, size, expiration_time, is_replied,
                is_replied_all, is_forwarded, address_id, external_id, num_attachments, flags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(user_id, message_id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                sort_order = excluded.sort_order,
                subject = excluded.subject,
                unread = excluded.unread,
                sender = excluded.sender,
                to_list = excluded.to_list,
                cc_list = excluded.cc_list,
                bcc_list = excluded.bcc_list,
                time = excluded.time,
                size = excluded.size,
                expiration_time = excluded.expiration_time,
                is_replied = excluded.is_replied,
                is_replied_all = excluded.is_replied_all,
                is_forwarded = excluded.is_forwarded,
                address_id = excluded.address_id,
                external_id = excluded.external_id,
                num_attachments = excluded.num_attachments,
                flags = excluded.flags",
            params![
                message.user_id.as_str(),
                message.message_id.as_str(),
                message.conversation_id.as_str(),
                message.order,
                message.subject,
                message.unread,
                to_json(&message.sender)?,
                to_json(&message.to_list)?,
                to_json(&message.cc_list)?,
                to_json(&message.bcc_list)?,
                message.time,
                message.size,
                message.expiration_time,
                message.is_replied,
                message.is_replied_all,
                message.is_forwarded,
                message.address_id,
                message.external_id,
                message.num_attachments,
                message.flags,
            ],
        )?;

        self.conn.execute(
            "DELETE FROM message_label WHERE user_id = ?1 AND message_id = ?2",
            params![message.user_id.as_str(), message.message_id.as_str()],
        )?;
        let mut insert = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO message_label (user_id, message_id, label_id) VALUES (?1, ?2, ?3)",
        )?;
        for label_id in &message.label_ids {
            insert.execute(params![
                message.user_id.as_str(),
                message.message_id.as_str(),
                label_id.as_str()
            ])?;
        }
        Ok(())
    }

    pub fn get(&self, user_id: &UserId, message_id: &MessageId) -> Result<Option<Message>> {
        let row = self
            .conn
            .query_row(
                "SELECT * FROM message WHERE user_id = ?1 AND message_id = ?2",
                params![user_id.as_str(), message_id.as_str()],
                |row| Self::row_to_message(row),
            )
            .optional()?;
        match row {
            Some(message) => Ok(Some(self.with_labels(message)?)),
            None => Ok(None),
        }
    }

    pub fn get_many(&self, user_id: &UserId, ids: &[MessageId]) -> Result<Vec<Message>> {
        self.select_in(user_id, "message_id", ids.iter().map(|id| id.0.clone()).collect())
    }

    pub fn get_in_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<Vec<Message>> {
        self.select_in(user_id, "conversation_id", ids.iter().map(|id| id.0.clone()).collect())
    }

    fn select_in(&self, user_id: &UserId, column: &str, ids: Vec<String>) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM message WHERE user_id = ?1 AND {} IN ({}) ORDER BY time ASC, sort_order ASC",
            column,
            placeholders(2, ids.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(ids.into_iter().map(Value::from));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| Self::row_to_message(row))?;
        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        messages.into_iter().map(|m| self.with_labels(m)).collect()
    }

    /// 分页查询：label + 关键字 + 已读过滤 + (time, order) 闭区间
    pub fn get_page(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<Message>> {
        let filter = &page_key.filter;
        let direction = match page_key.order_direction {
            OrderDirection::Ascending => "ASC",
            OrderDirection::Descending => "DESC",
        };
        let read_clause = match filter.read {
            ReadStatus::All => "",
            ReadStatus::Read => "AND m.unread = 0",
            ReadStatus::Unread => "AND m.unread = 1",
        };
        let sql = format!(
            "SELECT m.* FROM message m
             JOIN message_label ml ON ml.user_id = m.user_id AND ml.message_id = m.message_id
             WHERE m.user_id = ?1 AND ml.label_id = ?2
               AND (?3 = '' OR m.subject LIKE ?4 ESCAPE '\\' OR m.sender LIKE ?4 ESCAPE '\\'
                    OR m.to_list LIKE ?4 ESCAPE '\\' OR m.cc_list LIKE ?4 ESCAPE '\\')
               {read}
               AND (m.time > ?5 OR (m.time = ?5 AND m.sort_order >= ?6))
               AND (m.time < ?7 OR (m.time = ?7 AND m.sort_order <= ?8))
             ORDER BY m.time {dir}, m.sort_order {dir}, m.message_id {dir}
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
            |row| Self::row_to_message(row),
        )?;
        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        messages.into_iter().map(|m| self.with_labels(m)).collect()
    }

    pub fn delete(&self, user_id: &UserId, ids: &[MessageId]) -> Result<usize> {
        self.delete_in(user_id, "message_id", ids.iter().map(|id| id.0.clone()).collect())
    }

    pub fn delete_in_conversations(&self, user_id: &UserId, ids: &[ConversationId]) -> Result<usize> {
        self.delete_in(user_id, "conversation_id", ids.iter().map(|id| id.0.clone()).collect())
    }

    fn delete_in(&self, user_id: &UserId, column: &str, ids: Vec<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM message WHERE user_id = ?1 AND {} IN ({})",
            column,
            placeholders(2, ids.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(ids.into_iter().map(Value::from));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    /// 删除除 keep 之外的全部消息
    pub fn delete_all_except(&self, user_id: &UserId, keep: &[MessageId]) -> Result<usize> {
        if keep.is_empty() {
            return Ok(self
                .conn
                .execute("DELETE FROM message WHERE user_id = ?1", params![user_id.as_str()])?);
        }
        let sql = format!(
            "DELETE FROM message WHERE user_id = ?1 AND message_id NOT IN ({})",
            placeholders(2, keep.len())
        );
        let mut values = vec![Value::from(user_id.0.clone())];
        values.extend(keep.iter().map(|id| Value::from(id.0.clone())));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn delete_with_label(&self, user_id: &UserId, label_id: &LabelId) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM message WHERE user_id = ?1 AND message_id IN (
                SELECT message_id FROM message_label WHERE user_id = ?1 AND label_id = ?2
            )",
            params![user_id.as_str(), label_id.as_str()],
        )?)
    }

    fn with_labels(&self, mut message: Message) -> Result<Message> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT label_id FROM message_label WHERE user_id = ?1 AND message_id = ?2 ORDER BY label_id",
        )?;
        let rows = stmt.query_map(
            params![message.user_id.as_str(), message.message_id.as_str()],
            |row| Ok(LabelId(row.get(0)?)),
        )?;
        message.label_ids = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(message)
    }

    fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
        Ok(Message {
            user_id: UserId(row.get("user_id")?),
            message_id: MessageId(row.get("message_id")?),
            conversation_id: ConversationId(row.get("conversation_id")?),
            order: row.get("sort_order")?,
            subject: row.get("subject")?,
            unread: row.get("unread")?,
            sender: json_column(row, "sender")?,
            to_list: json_column(row, "to_list")?,
            cc_list: json_column(row, "cc_list")?,
            bcc_list: json_column(row, "bcc_list")?,
            time: row.get("time")?,
            size: row.get("size")?,
            expiration_time: row.get("expiration_time")?,
            is_replied: row.get("is_replied")?,
            is_replied_all: row.get("is_replied_all")?,
            is_forwarded: row.get("is_forwarded")?,
            address_id: row.get("address_id")?,
            external_id: row.get("external_id")?,
            num_attachments: row.get("num_attachments")?,
            flags: row.get("flags")?,
            label_ids: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dao::test_support::{message, open};

    #[test]
    fn upsert_and_read_back_labels() {
        let conn = open();
        let dao = MessageDao::new(&conn);
        let user = UserId::from("u1");
        let m = message("m1", "c1", 100, &["0", "5"], true);
        dao.upsert(&m).unwrap();

        assert_eq!(dao.get(&user, &MessageId::from("m1")).unwrap(), Some(m.clone()));

        let mut relabeled = m.clone();
        relabeled.label_ids = vec![LabelId::from("6")];
        dao.upsert(&relabeled).unwrap();
        assert_eq!(
            dao.get(&user, &MessageId::from("m1")).unwrap().unwrap().label_ids,
            vec![LabelId::from("6")]
        );
    }

    #[test]
    fn page_by_label_and_read_state() {
        let conn = open();
        let dao = MessageDao::new(&conn);
        let user = UserId::from("u1");
        dao.upsert(&message("m1", "c1", 100, &["0"], true)).unwrap();
        dao.upsert(&message("m2", "c1", 200, &["0"], false)).unwrap();
        dao.upsert(&message("m3", "c2", 300, &["6"], true)).unwrap();

        let inbox = dao.get_page(&user, &PageKey::for_label("0")).unwrap();
        let ids: Vec<_> = inbox.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1"]);

        let unread = dao
            .get_page(&user, &PageKey::for_label("0").with_read(ReadStatus::Unread))
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].message_id, MessageId::from("m1"));
    }

    #[test]
    fn delete_all_except_keeps_listed() {
        let conn = open();
        let dao = MessageDao::new(&conn);
        let user = UserId::from("u1");
        dao.upsert(&message("m1", "c1", 100, &["0"], true)).unwrap();
        dao.upsert(&message("m2", "c1", 200, &["8"], false)).unwrap();

        assert_eq!(dao.delete_all_except(&user, &[MessageId::from("m2")]).unwrap(), 1);
        assert!(dao.get(&user, &MessageId::from("m1")).unwrap().is_none());
        assert!(dao.get(&user, &MessageId::from("m2")).unwrap().is_some());
    }
}
