//! 未读计数数据访问层 - 消息计数与会话计数共用一套操作，按 CounterKind 选表

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::model::{CounterKind, LabelId, UnreadCount, UserId};

pub struct UnreadCountDao<'a> {
    conn: &'a Connection,
    table: &'static str,
}

impl<'a> UnreadCountDao<'a> {
    pub fn new(conn: &'a Connection, kind: CounterKind) -> Self {
        let table = match kind {
            CounterKind::Messages => "unread_messages_count",
            CounterKind::Conversations => "unread_conversations_count",
        };
        Self { conn, table }
    }

    pub fn upsert(&self, user_id: &UserId, count: &UnreadCount) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, label_id, total_count, unread_count) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, label_id) DO UPDATE SET
                total_count = excluded.total_count,
                unread_count = excluded.unread_count",
            self.table
        );
        self.conn.execute(
            &sql,
            params![user_id.as_str(), count.label_id.as_str(), count.total, count.unread],
        )?;
        Ok(())
    }

    pub fn get(&self, user_id: &UserId, label_id: &LabelId) -> Result<Option<UnreadCount>> {
        let sql = format!(
            "SELECT label_id, total_count, unread_count FROM {} WHERE user_id = ?1 AND label_id = ?2",
            self.table
        );
        Ok(self
            .conn
            .query_row(&sql, params![user_id.as_str(), label_id.as_str()], |row| {
                Ok(UnreadCount {
                    label_id: LabelId(row.get(0)?),
                    total: row.get(1)?,
                    unread: row.get(2)?,
                })
            })
            .optional()?)
    }

    pub fn get_all(&self, user_id: &UserId) -> Result<Vec<UnreadCount>> {
        let sql = format!(
            "SELECT label_id, total_count, unread_count FROM {} WHERE user_id = ?1 ORDER BY label_id",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id.as_str()], |row| {
            Ok(UnreadCount {
                label_id: LabelId(row.get(0)?),
                total: row.get(1)?,
                unread: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 在现有计数上做增量调整，结果不小于 0；无记录时不做任何事
    pub fn adjust(&self, user_id: &UserId, label_id: &LabelId, total_delta: i32, unread_delta: i32) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET
                total_count = MAX(total_count + ?3, 0),
                unread_count = MAX(MIN(unread_count + ?4, MAX(total_count + ?3, 0)), 0)
             WHERE user_id = ?1 AND label_id = ?2",
            self.table
        );
        let changed = self.conn.execute(
            &sql,
            params![user_id.as_str(), label_id.as_str(), total_delta, unread_delta],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_all(&self, user_id: &UserId) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE user_id = ?1", self.table);
        Ok(self.conn.execute(&sql, params![user_id.as_str()])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::dao::test_support::open;

    fn count(label: &str, total: i32, unread: i32) -> UnreadCount {
        UnreadCount {
            label_id: LabelId::from(label),
            total,
            unread,
        }
    }

    #[test]
    fn kinds_use_separate_tables() {
        let conn = open();
        let user = UserId::from("u1");
        UnreadCountDao::new(&conn, CounterKind::Messages)
            .upsert(&user, &count("0", 10, 3))
            .unwrap();

        assert_eq!(
            UnreadCountDao::new(&conn, CounterKind::Messages).get_all(&user).unwrap(),
            vec![count("0", 10, 3)]
        );
        assert!(UnreadCountDao::new(&conn, CounterKind::Conversations)
            .get_all(&user)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn adjust_floors_at_zero() {
        let conn = open();
        let user = UserId::from("u1");
        let dao = UnreadCountDao::new(&conn, CounterKind::Conversations);
        dao.upsert(&user, &count("0", 2, 1)).unwrap();

        assert!(dao.adjust(&user, &LabelId::from("0"), 0, -5).unwrap());
        assert_eq!(dao.get(&user, &LabelId::from("0")).unwrap(), Some(count("0", 2, 0)));

        assert!(dao.adjust(&user, &LabelId::from("0"), 0, 10).unwrap());
        assert_eq!(dao.get(&user, &LabelId::from("0")).unwrap(), Some(count("0", 2, 2)));

        assert!(!dao.adjust(&user, &LabelId::from("9"), 1, 1).unwrap());
        println!("✅ 计数调整上下限正确");
    }
}
