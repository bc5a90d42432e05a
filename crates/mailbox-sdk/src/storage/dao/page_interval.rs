//! 分页区间数据访问层 - 写入新区间时与重叠区间合并

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::placeholders;
use crate::error::Result;
use crate::model::{LabelId, UserId};
use crate::paging::{
    interval_for_page, merge_intervals, OrderBy, PageInterval, PageItem, PageItemType, PageKey,
    ReadStatus,
};

pub struct PageIntervalDao<'a> {
    conn: &'a Connection,
}

impl<'a> PageIntervalDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 与 key 的过滤条件（类型、排序、label、关键字、已读）完全相同的区间
    pub fn get_all(&self, user_id: &UserId, item_type: PageItemType, page_key: &PageKey) -> Result<Vec<PageInterval>> {
        Ok(self
            .get_rows(user_id, item_type, page_key)?
            .into_iter()
            .map(|(_, interval)| interval)
            .collect())
    }

    fn get_rows(
        &self,
        user_id: &UserId,
        item_type: PageItemType,
        page_key: &PageKey,
    ) -> Result<Vec<(i64, PageInterval)>> {
        let filter = &page_key.filter;
        let mut stmt = self.conn.prepare_cached(
            "SELECT * FROM page_interval
             WHERE user_id = ?1 AND item_type = ?2 AND order_by = ?3
               AND label_id = ?4 AND keyword = ?5 AND read_state = ?6
             ORDER BY min_value, min_order",
        )?;
        let rows = stmt.query_map(
            params![
                user_id.as_str(),
                item_type.as_str(),
                page_key.order_by.as_str(),
                filter.label_id.as_str(),
                filter.keyword,
                filter.read.as_str(),
            ],
            |row| Ok((row.get::<_, i64>("id")?, Self::row_to_interval(row, item_type)?)),
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 根据一页数据生成区间，合并所有重叠区间后写回
    pub fn upsert_for_page<T: PageItem>(
        &self,
        user_id: &UserId,
        item_type: PageItemType,
        page_key: &PageKey,
        items: &[T],
    ) -> Result<PageInterval> {
        let new = interval_for_page(item_type, page_key, items);
        let rows = self.get_rows(user_id, item_type, page_key)?;
        let existing: Vec<PageInterval> = rows.iter().map(|(_, i)| i.clone()).collect();
        let outcome = merge_intervals(&existing, new);

        let absorbed_ids: Vec<i64> = rows
            .iter()
            .filter(|(_, interval)| outcome.absorbed.contains(interval))
            .map(|(id, _)| *id)
            .collect();
        self.delete_ids(&absorbed_ids)?;
        self.insert(user_id, &outcome.merged)?;
        Ok(outcome.merged)
    }

    pub fn insert(&self, user_id: &UserId, interval: &PageInterval) -> Result<()> {
        self.conn.execute(
            "INSERT INTO page_interval (
                user_id, item_type, order_by, label_id, keyword, read_state,
                min_value, max_value, min_order, max_order, min_id, max_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user_id.as_str(),
                interval.item_type.as_str(),
                interval.order_by.as_str(),
                interval.label_id.as_str(),
                interval.keyword,
                interval.read.as_str(),
                interval.min_value,
                interval.max_value,
                interval.min_order,
                interval.max_order,
                interval.min_id,
                interval.max_id,
            ],
        )?;
        Ok(())
    }

    fn delete_ids(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM page_interval WHERE id IN ({})", placeholders(1, ids.len()));
        Ok(self
            .conn
            .execute(&sql, params_from_iter(ids.iter().map(|id| Value::from(*id))))?)
    }

    /// 标记某个 label 的已拉取区间失效
    pub fn delete_for_label(&self, user_id: &UserId, item_type: PageItemType, label_id: &LabelId) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM page_interval WHERE user_id = ?1 AND item_type = ?2 AND label_id = ?3",
            params![user_id.as_str(), item_type.as_str(), label_id.as_str()],
        )?)
    }

    pub fn delete_all(&self, user_id: &UserId, item_type: PageItemType) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM page_interval WHERE user_id = ?1 AND item_type = ?2",
            params![user_id.as_str(), item_type.as_str()],
        )?)
    }

    fn row_to_interval(row: &Row<'_>, item_type: PageItemType) -> rusqlite::Result<PageInterval> {
        let read: String = row.get("read_state")?;
        Ok(PageInterval {
            item_type,
            order_by: OrderBy::Time,
            label_id: LabelId(row.get("label_id")?),
            keyword: row.get("keyword")?,
            read: ReadStatus::parse(&read),
            min_value: row.get("min_value")?,
            max_value: row.get("max_value")?,
            min_order: row.get("min_order")?,
            max_order: row.get("max_order")?,
            min_id: row.get("min_id")?,
            max_id: row.get("max_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use crate::paging::OrderDirection;
    use crate::storage::dao::test_support::{message, open};

    fn page(times: &[i64]) -> Vec<Message> {
        times
            .iter()
            .map(|t| message(&format!("m{}", t), "c", *t, &["0"], false))
            .collect()
    }

    #[test]
    fn adjacent_pages_merge_into_one_interval() {
        let conn = open();
        let dao = PageIntervalDao::new(&conn);
        let user = UserId::from("u1");

        let first = PageKey::for_label("0").with_size(2);
        dao.upsert_for_page(&user, PageItemType::Message, &first, &page(&[500, 400]))
            .unwrap();

        let mut second = first.clone();
        second.filter.max_time = 400;
        second.filter.max_order = 400;
        dao.upsert_for_page(&user, PageItemType::Message, &second, &page(&[300, 200]))
            .unwrap();

        let intervals = dao.get_all(&user, PageItemType::Message, &first).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].min_value, 200);
        assert_eq!(intervals[0].max_value, i64::MAX);
        println!("✅ 相接区间已合并");
    }

    #[test]
    fn intervals_are_scoped_by_filter() {
        let conn = open();
        let dao = PageIntervalDao::new(&conn);
        let user = UserId::from("u1");

        let inbox = PageKey::for_label("0");
        dao.upsert_for_page::<Message>(&user, PageItemType::Message, &inbox, &[])
            .unwrap();

        let unread = inbox.clone().with_read(ReadStatus::Unread);
        assert!(dao.get_all(&user, PageItemType::Message, &unread).unwrap().is_empty());
        let ascending = inbox.clone().with_direction(OrderDirection::Ascending);
        assert_eq!(dao.get_all(&user, PageItemType::Message, &ascending).unwrap().len(), 1);
        assert!(dao
            .get_all(&user, PageItemType::Conversation, &inbox)
            .unwrap()
            .is_empty());

        assert_eq!(
            dao.delete_for_label(&user, PageItemType::Message, &LabelId::from("0")).unwrap(),
            1
        );
    }
}
