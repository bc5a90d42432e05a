//! 数据库 Actor - 单线程数据库访问模型
//!
//! - SQLite Connection 只存在于一个专用线程中
//! - 所有数据库操作以闭包形式经 channel 发送，结果经 oneshot 返回
//! - 写操作在一个事务内执行

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use rusqlite::{Connection, Transaction};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{MailboxSdkError, Result};
use crate::model::UserId;

/// 在 actor 线程上执行的任务；用户未初始化时收到 Err
type DbJob = Box<dyn FnOnce(Result<&mut Connection>) + Send + 'static>;

/// 数据库命令
enum DbCommand {
    /// 打开并初始化用户数据库
    InitUser {
        uid: UserId,
        db_path: PathBuf,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 在用户连接上执行任务
    Run { uid: UserId, job: DbJob },
    /// 关闭用户数据库
    CloseUser {
        uid: UserId,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

struct DbActor {
    /// 每个用户一个连接
    connections: HashMap<UserId, Connection>,
    receiver: Receiver<DbCommand>,
    thread_id: thread::ThreadId,
}

impl DbActor {
    fn new(receiver: Receiver<DbCommand>) -> Self {
        let thread_id = thread::current().id();
        info!("🚀 [Thread {:?}] DbActor 已启动", thread_id);
        Self {
            connections: HashMap::new(),
            receiver,
            thread_id,
        }
    }

    fn run(mut self) {
        while let Ok(command) = self.receiver.recv() {
            match command {
                DbCommand::Shutdown => {
                    info!("🛑 [Thread {:?}] DbActor 收到停止信号", self.thread_id);
                    break;
                }
                DbCommand::InitUser {
                    uid,
                    db_path,
                    respond_to,
                } => {
                    let result = self.handle_init_user(&uid, &db_path);
                    let _ = respond_to.send(result);
                }
                DbCommand::Run { uid, job } => match self.connections.get_mut(&uid) {
                    Some(conn) => job(Ok(conn)),
                    None => {
                        warn!("⚠️ [Thread {:?}] 用户数据库未初始化: uid={}", self.thread_id, uid);
                        job(Err(MailboxSdkError::NotInitialized(format!(
                            "用户数据库未初始化: {}",
                            uid
                        ))))
                    }
                },
                DbCommand::CloseUser { uid, respond_to } => {
                    if self.connections.remove(&uid).is_some() {
                        info!("✅ [Thread {:?}] 已关闭用户数据库: uid={}", self.thread_id, uid);
                    }
                    let _ = respond_to.send(Ok(()));
                }
            }
        }
        info!("👋 [Thread {:?}] DbActor 已退出", self.thread_id);
    }

    fn handle_init_user(&mut self, uid: &UserId, db_path: &PathBuf) -> Result<()> {
        if self.connections.contains_key(uid) {
            debug!("用户数据库已初始化，跳过: uid={}", uid);
            return Ok(());
        }

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(db_path).map_err(|e| {
            error!(
                "❌ [DbActor Thread {:?}] 打开数据库失败: uid={}, error={}",
                self.thread_id, uid, e
            );
            MailboxSdkError::Database(format!("打开数据库失败: {}", e))
        })?;

        crate::storage::migrate::init_db(&mut conn)?;

        info!(
            "✅ [DbActor Thread {:?}] 用户数据库就绪: uid={}, path={}",
            self.thread_id,
            uid,
            db_path.display()
        );
        self.connections.insert(uid.clone(), conn);
        Ok(())
    }
}

/// 数据库 Actor 句柄（用于异步调用）
#[derive(Clone)]
pub struct DbActorHandle {
    sender: Sender<DbCommand>,
}

impl std::fmt::Debug for DbActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbActorHandle")
            .field("sender", &"<channel>")
            .finish()
    }
}

impl DbActorHandle {
    /// 启动 DB Actor 线程
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = unbounded();

        thread::Builder::new()
            .name("db-actor".to_string())
            .spawn(move || DbActor::new(receiver).run())
            .map_err(|e| MailboxSdkError::Other(format!("无法启动 DB Actor 线程: {}", e)))?;

        Ok(Self { sender })
    }

    fn send(&self, command: DbCommand) -> Result<()> {
        self.sender
            .send(command)
            .map_err(|_| MailboxSdkError::ShuttingDown("DB Actor 已停止".to_string()))
    }

    async fn recv<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        rx.await
            .map_err(|_| MailboxSdkError::Other("DB Actor 响应失败".to_string()))?
    }

    pub async fn init_user(&self, uid: UserId, db_path: PathBuf) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(DbCommand::InitUser {
            uid,
            db_path,
            respond_to: tx,
        })?;
        Self::recv(rx).await
    }

    pub async fn close_user(&self, uid: UserId) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(DbCommand::CloseUser { uid, respond_to: tx })?;
        Self::recv(rx).await
    }

    /// 在用户连接上执行只读闭包
    pub async fn call<F, T>(&self, uid: UserId, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: DbJob = Box::new(move |conn| {
            let _ = tx.send(conn.and_then(|c| f(c)));
        });
        self.send(DbCommand::Run { uid, job })?;
        Self::recv(rx).await
    }

    /// 在一个事务内执行闭包：闭包返回 Err 时回滚
    pub async fn transaction<F, T>(&self, uid: UserId, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: DbJob = Box::new(move |conn| {
            let result = conn.and_then(|c| {
                let txn = c.transaction()?;
                let value = f(&txn)?;
                txn.commit()?;
                Ok(value)
            });
            let _ = tx.send(result);
        });
        self.send(DbCommand::Run { uid, job })?;
        Self::recv(rx).await
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(DbCommand::Shutdown);
    }
}
