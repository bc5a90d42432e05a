//! 数据库迁移与初始化 - 由 refinery 管理
//!
//! 统一入口 `init_db`：pragmas → migrate → 版本校验。
//! 新增迁移只需在 migrations/ 添加 V{n}__{name}.sql。

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

use rusqlite::Connection;

use crate::error::{MailboxSdkError, Result};
use crate::version::SDK_DB_VERSION;

/// refinery 使用的 migration 历史表名
const REFINERY_TABLE: &str = "refinery_schema_history";

/// 本地缓存推荐 PRAGMA：WAL、NORMAL 同步、外键、内存临时表
const CACHE_PRAGMAS: &str = "
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
PRAGMA foreign_keys=ON;
PRAGMA temp_store=MEMORY;
";

pub fn enable_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(CACHE_PRAGMAS.trim())
        .map_err(|e| MailboxSdkError::Database(format!("设置 PRAGMA 失败: {}", e)))?;
    Ok(())
}

/// 执行内置 migrations（编译期嵌入，按版本顺序执行）
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| MailboxSdkError::Migration(format!("执行 migration 失败: {}", e)))?;
    Ok(())
}

/// 当前数据库的 migration 版本；无表或空表返回 None
fn get_db_migration_version(conn: &Connection) -> Result<Option<i64>> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
        [REFINERY_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let version: Option<i64> = conn.query_row(
        &format!("SELECT MAX(version) FROM {}", REFINERY_TABLE),
        [],
        |row| row.get::<_, Option<i64>>(0),
    )?;
    Ok(version.filter(|&v| v > 0))
}

/// DB 版本高于 SDK 支持的最高版本时拒绝打开
fn check_db_version(conn: &Connection) -> Result<()> {
    let Some(v) = get_db_migration_version(conn)? else {
        return Ok(());
    };
    if v > SDK_DB_VERSION {
        return Err(MailboxSdkError::Database(format!(
            "数据库版本 {} 高于当前 SDK 支持的最高版本 {}，请升级 SDK 后再打开",
            v, SDK_DB_VERSION
        )));
    }
    Ok(())
}

pub fn init_db(conn: &mut Connection) -> Result<()> {
    enable_pragmas(conn)?;
    run_migrations(conn)?;
    check_db_version(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_schema_and_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        init_db(&mut conn).unwrap();

        for table in ["conversation", "conversation_label", "message", "message_label", "page_interval", "outbox"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {}", table);
        }
        assert_eq!(get_db_migration_version(&conn).unwrap(), Some(SDK_DB_VERSION));
    }

    #[test]
    fn newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_db(&mut conn).unwrap();
        conn.execute(
            &format!(
                "INSERT INTO {} (version, name, applied_on, checksum) VALUES (?1, 'future', '', '0')",
                REFINERY_TABLE
            ),
            [SDK_DB_VERSION + 1],
        )
        .unwrap();
        assert!(check_db_version(&conn).is_err());
    }
}
