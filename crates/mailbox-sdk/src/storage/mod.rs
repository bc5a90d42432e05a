//! 存储模块 - 邮箱缓存的数据持久化层
//!
//! 分层结构：
//! - StorageManager: 统一入口，按用户管理 SQLite 连接（经 DB Actor）与 KV 存储
//! - DAO Layer: 每张表一个操作模块，只借用 `&Connection`
//! - 写事务提交后通过 ChangeNotifier 广播变更，observe 流据此重新查询

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use rusqlite::{Connection, Transaction};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

use crate::error::{MailboxSdkError, Result};
use crate::events::{ChangeNotifier, Table};
use crate::model::UserId;

pub mod dao;
pub mod db_actor;
pub mod kv;
pub mod migrate;
pub mod queue;

pub use db_actor::DbActorHandle;
pub use kv::{KvStore, KvTree};

/// 用户数据库文件名
pub const MAILBOX_DB_FILE: &str = "mailbox.db";

/// 观察流的查询函数
pub type ObserveQuery<T> = Arc<dyn Fn(&Connection) -> Result<T> + Send + Sync>;

/// 存储管理器
///
/// - 每个用户独立数据库 `{base}/users/{uid}/mailbox.db`
/// - 所有 SQLite 访问都串行化到 DB Actor 线程
/// - `write` 在事务内执行，提交成功后才广播变更
#[derive(Debug)]
pub struct StorageManager {
    base_path: PathBuf,
    db_actor: DbActorHandle,
    kv: Arc<KvStore>,
    notifier: ChangeNotifier,
    users: RwLock<HashSet<UserId>>,
}

impl StorageManager {
    pub async fn open(base_path: &Path, event_capacity: usize) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(base_path)
            .await
            .map_err(|e| MailboxSdkError::IO(format!("创建存储目录失败: {}", e)))?;

        let db_actor = DbActorHandle::spawn()?;
        let kv = KvStore::open(base_path).await?;
        info!("✅ 存储管理器已启动: {}", base_path.display());

        Ok(Arc::new(Self {
            base_path: base_path.to_path_buf(),
            db_actor,
            kv,
            notifier: ChangeNotifier::new(event_capacity),
            users: RwLock::new(HashSet::new()),
        }))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 用户目录；用户 ID 必须是单个普通路径段，不能跳出 `users/`
    pub fn user_dir(&self, user_id: &UserId) -> Result<PathBuf> {
        let raw = user_id.as_str();
        let mut components = Path::new(raw).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(part)), None) if part == raw
        );
        if !single_normal || raw.contains(['/', '\\']) {
            return Err(MailboxSdkError::InvalidArgument(format!("非法用户 ID: {:?}", raw)));
        }
        Ok(self.base_path.join("users").join(raw))
    }

    pub fn kv(&self) -> &Arc<KvStore> {
        &self.kv
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn is_user_initialized(&self, user_id: &UserId) -> bool {
        self.users.read().contains(user_id)
    }

    /// 打开（必要时创建并迁移）用户数据库；幂等
    pub async fn init_user(&self, user_id: &UserId) -> Result<()> {
        if self.is_user_initialized(user_id) {
            debug!("用户数据库已初始化: {}", user_id);
            return Ok(());
        }
        let db_path = self.user_dir(user_id)?.join(MAILBOX_DB_FILE);
        self.db_actor.init_user(user_id.clone(), db_path).await?;
        self.users.write().insert(user_id.clone());
        info!("✅ 用户数据库已就绪: {}", user_id);
        Ok(())
    }

    pub async fn close_user(&self, user_id: &UserId) -> Result<()> {
        if !self.users.write().remove(user_id) {
            return Ok(());
        }
        self.db_actor.close_user(user_id.clone()).await?;
        info!("用户数据库已关闭: {}", user_id);
        Ok(())
    }

    /// 关闭并删除用户的全部本地数据（数据库 + KV）
    pub async fn remove_user_data(&self, user_id: &UserId) -> Result<()> {
        let dir = self.user_dir(user_id)?;
        self.close_user(user_id).await?;
        self.kv.cleanup_user_data(user_id)?;
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| MailboxSdkError::IO(format!("删除用户目录失败: {}", e)))?;
        }
        warn!("⚠️ 已清除用户本地数据: {}", user_id);
        Ok(())
    }

    pub async fn read<F, T>(&self, user_id: &UserId, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.db_actor.call(user_id.clone(), f).await
    }

    /// 在事务内写入；提交成功后广播 `tables` 的变更
    pub async fn write<F, T>(&self, user_id: &UserId, tables: &[Table], f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let value = self.db_actor.transaction(user_id.clone(), f).await?;
        self.notifier.emit(user_id, tables);
        Ok(value)
    }

    /// 先订阅、再查询：首个元素是当前值，之后每次相关表提交变更都重新查询一次。
    ///
    /// 广播滞后（Lagged）时直接重新查询；广播关闭或存储关闭时流结束。
    pub fn observe<T>(
        &self,
        user_id: &UserId,
        tables: &'static [Table],
        query: ObserveQuery<T>,
    ) -> BoxStream<'static, Result<T>>
    where
        T: Send + 'static,
    {
        let receiver = self.notifier.subscribe();
        let db = self.db_actor.clone();
        let user_id = user_id.clone();

        stream::unfold(Some((receiver, true)), move |state| {
            let db = db.clone();
            let query = query.clone();
            let user_id = user_id.clone();
            async move {
                let (mut receiver, first) = state?;
                if !first {
                    loop {
                        match receiver.recv().await {
                            Ok(event) if event.touches(&user_id, tables) => break,
                            Ok(_) => continue,
                            Err(RecvError::Lagged(skipped)) => {
                                debug!("观察流落后 {} 条变更，重新查询", skipped);
                                break;
                            }
                            Err(RecvError::Closed) => return None,
                        }
                    }
                    // 合并已积压的变更，只查询一次
                    loop {
                        match receiver.try_recv() {
                            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                        }
                    }
                }

                let result = db.call(user_id.clone(), move |conn| query(conn)).await;
                let next = match &result {
                    Err(MailboxSdkError::ShuttingDown(_)) => None,
                    _ => Some((receiver, false)),
                };
                Some((result, next))
            }
        })
        .boxed()
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.kv.flush().await {
            warn!("⚠️ 关闭前刷新 KV 失败: {}", e);
        }
        self.db_actor.shutdown();
        self.users.write().clear();
        info!("存储管理器已关闭");
    }
}
