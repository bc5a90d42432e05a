//! 统一 SDK 接口 - MailboxSdk 主入口
//!
//! 分层架构设计：
//! ```text
//! MailboxSdk
//!   ├── StorageManager (SQLite 每用户库 + sled KV)
//!   ├── ApiClient (HTTP)
//!   ├── Repository (会话 / 消息 / 未读计数)
//!   ├── JobQueue + JobRunner (远端变更任务)
//!   └── EventManager (增量同步)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{MailboxSdkError, Result};
use crate::local::{
    OutboxLocalDataSource, SqliteConversationLocalDataSource, SqliteMessageLocalDataSource,
    SqliteOutboxLocalDataSource, SqliteUnreadCountLocalDataSource,
};
use crate::logging::{init_logging, LoggingConfig};
use crate::model::UserId;
use crate::remote::{
    ApiClient, ApiConversationRemoteDataSource, ApiEventRemoteDataSource, ApiMessageRemoteDataSource,
    ApiUnreadCountRemoteDataSource, HttpClientConfig, LabelApi, Session,
};
use crate::repository::{ConversationRepository, MessageRepository, UnreadCountRepository};
use crate::storage::queue::{JobQueue, JobRunner, RetryPolicy};
use crate::storage::StorageManager;
use crate::sync::{
    ConversationEventListener, EventListener, EventManager, MessageEventListener, UnreadCountEventListener,
};

/// 事件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// 本地变更广播缓冲区大小
    pub capacity: usize,
    /// 服务端事件轮询间隔（秒）
    pub poll_interval_secs: u64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            poll_interval_secs: 30,
        }
    }
}

/// 任务队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 执行到期任务的间隔（秒）
    pub run_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { run_interval_secs: 5 }
    }
}

/// Mailbox SDK 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// API 基础 URL，例如 https://mail.proton.me/api
    pub api_base_url: String,
    pub http: HttpClientConfig,
    pub retry: RetryPolicy,
    pub event: EventConfig,
    pub queue: QueueConfig,
    pub logging: LoggingConfig,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            api_base_url: "https://mail.proton.me/api".to_string(),
            http: HttpClientConfig::default(),
            retry: RetryPolicy::default(),
            event: EventConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// 获取默认数据目录 ~/.mailbox/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".mailbox")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".mailbox")
    } else {
        PathBuf::from("./mailbox_data")
    }
}

impl MailboxConfig {
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::new()
    }

    /// 从 JSON 文件加载；缺失字段取默认值
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MailboxSdkError::Config(format!("读取配置文件失败 {:?}: {}", path.as_ref(), e)))?;
        let config: MailboxConfig = serde_json::from_str(&content)
            .map_err(|e| MailboxSdkError::Config(format!("解析配置文件失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(MailboxSdkError::Config("API 基础 URL 不能为空".to_string()));
        }
        if self.http.connect_timeout_secs == Some(0) || self.http.request_timeout_secs == Some(0) {
            return Err(MailboxSdkError::Config("HTTP 超时必须大于 0".to_string()));
        }
        if self.event.capacity == 0 {
            return Err(MailboxSdkError::Config("事件缓冲区大小不能为 0".to_string()));
        }
        if self.event.poll_interval_secs == 0 || self.queue.run_interval_secs == 0 {
            return Err(MailboxSdkError::Config("轮询间隔必须大于 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(MailboxSdkError::Config("最大重试次数不能为 0".to_string()));
        }
        Ok(())
    }
}

/// Mailbox SDK 配置构建器
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    config: MailboxConfig,
}

impl MailboxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http = config;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn event_config(mut self, config: EventConfig) -> Self {
        self.config.event = config;
        self
    }

    pub fn queue_config(mut self, config: QueueConfig) -> Self {
        self.config.queue = config;
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.config.logging = config;
        self
    }

    pub fn build(self) -> Result<MailboxConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// SDK 主入口
pub struct MailboxSdk {
    config: MailboxConfig,
    storage: Arc<StorageManager>,
    api: Arc<ApiClient>,
    job_queue: JobQueue,
    outbox: Arc<dyn OutboxLocalDataSource>,
    conversations: Arc<ConversationRepository>,
    messages: Arc<MessageRepository>,
    unread_counts: Arc<UnreadCountRepository>,
    event_manager: Arc<EventManager>,
    shutdown: CancellationToken,
    runner_task: Mutex<Option<JoinHandle<()>>>,
    /// 每个已登录用户的事件轮询任务
    user_tasks: Mutex<HashMap<UserId, (CancellationToken, JoinHandle<()>)>>,
}

impl MailboxSdk {
    pub async fn new(config: MailboxConfig) -> Result<Arc<Self>> {
        config.validate()?;
        init_logging(&config.logging);
        info!("🚀 正在初始化 MailboxSdk {}...", crate::version::SDK_VERSION);

        // === 第1层：存储 ===
        let storage = StorageManager::open(&config.data_dir, config.event.capacity).await?;

        // === 第2层：HTTP 与任务队列 ===
        let api = Arc::new(ApiClient::new(&config.api_base_url, &config.http)?);
        let job_queue = JobQueue::open(storage.kv())?;

        // === 第3层：数据源 ===
        let conversation_local = Arc::new(SqliteConversationLocalDataSource::new(storage.clone()));
        let message_local = Arc::new(SqliteMessageLocalDataSource::new(storage.clone()));
        let unread_local = Arc::new(SqliteUnreadCountLocalDataSource::new(storage.clone()));
        let outbox: Arc<dyn OutboxLocalDataSource> = Arc::new(SqliteOutboxLocalDataSource::new(storage.clone()));

        let conversation_remote = Arc::new(ApiConversationRemoteDataSource::new(api.clone(), job_queue.clone()));
        let message_remote = Arc::new(ApiMessageRemoteDataSource::new(api.clone(), job_queue.clone()));
        let unread_remote = Arc::new(ApiUnreadCountRemoteDataSource::new(api.clone()));
        let event_remote = Arc::new(ApiEventRemoteDataSource::new(api.clone()));

        // === 第4层：仓库 ===
        let conversations = Arc::new(ConversationRepository::new(
            conversation_local.clone(),
            message_local.clone(),
            conversation_remote.clone(),
        ));
        let messages = Arc::new(MessageRepository::new(message_local.clone(), message_remote.clone()));
        let unread_counts = Arc::new(UnreadCountRepository::new(unread_local.clone(), unread_remote.clone()));

        // === 第5层：增量同步 ===
        let listeners: Vec<Arc<dyn EventListener>> = vec![
            Arc::new(ConversationEventListener::new(
                conversation_local,
                message_local.clone(),
                outbox.clone(),
                conversation_remote,
            )),
            Arc::new(MessageEventListener::new(message_local, outbox.clone(), message_remote)),
            Arc::new(UnreadCountEventListener::new(unread_local, unread_remote)),
        ];
        let event_manager = Arc::new(EventManager::new(storage.clone(), event_remote, listeners));

        // === 第6层：后台任务执行器 ===
        let shutdown = CancellationToken::new();
        let runner = Arc::new(JobRunner::new(
            job_queue.clone(),
            Arc::new(LabelApi::new(api.clone())),
            config.retry.clone(),
        ));
        let runner_task = runner.spawn(
            Duration::from_secs(config.queue.run_interval_secs),
            shutdown.child_token(),
        );

        info!("✅ MailboxSdk 初始化完成: data_dir={:?}", config.data_dir);
        Ok(Arc::new(Self {
            config,
            storage,
            api,
            job_queue,
            outbox,
            conversations,
            messages,
            unread_counts,
            event_manager,
            shutdown,
            runner_task: Mutex::new(Some(runner_task)),
            user_tasks: Mutex::new(HashMap::new()),
        }))
    }

    /// 登录：打开用户库、登记会话凭据并启动事件轮询
    pub async fn login(&self, user_id: &UserId, session: Session) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(MailboxSdkError::ShuttingDown("SDK 已关闭".to_string()));
        }
        self.storage.init_user(user_id).await?;
        self.api.set_session(user_id, session);

        let mut tasks = self.user_tasks.lock();
        if !tasks.contains_key(user_id) {
            let token = self.shutdown.child_token();
            let handle = self.event_manager.clone().start(
                user_id.clone(),
                Duration::from_secs(self.config.event.poll_interval_secs),
                token.clone(),
            );
            tasks.insert(user_id.clone(), (token, handle));
        }
        info!("✅ 用户已登录: {}", user_id);
        Ok(())
    }

    /// 登出：停止轮询、关闭用户库、移除凭据并丢弃未完成的远端任务
    pub async fn logout(&self, user_id: &UserId) -> Result<()> {
        let task = self.user_tasks.lock().remove(user_id);
        if let Some((token, handle)) = task {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("⚠️ 事件轮询任务退出异常: {}", e);
            }
        }
        self.api.remove_session(user_id);
        let dropped = self.job_queue.remove_user(user_id)?;
        self.storage.close_user(user_id).await?;
        info!("用户已登出: {}, 丢弃任务 {} 个", user_id, dropped);
        Ok(())
    }

    /// 登出并删除该用户的全部本地数据
    pub async fn remove_account(&self, user_id: &UserId) -> Result<()> {
        self.logout(user_id).await?;
        self.storage.remove_user_data(user_id).await
    }

    pub fn is_logged_in(&self, user_id: &UserId) -> bool {
        self.storage.is_user_initialized(user_id) && self.api.has_session(user_id)
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn conversations(&self) -> &Arc<ConversationRepository> {
        &self.conversations
    }

    pub fn messages(&self) -> &Arc<MessageRepository> {
        &self.messages
    }

    pub fn unread_counts(&self) -> &Arc<UnreadCountRepository> {
        &self.unread_counts
    }

    pub fn outbox(&self) -> &Arc<dyn OutboxLocalDataSource> {
        &self.outbox
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.event_manager
    }

    pub fn job_queue(&self) -> &JobQueue {
        &self.job_queue
    }

    pub async fn shutdown(&self) {
        info!("正在关闭 MailboxSdk...");
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self.user_tasks.lock().drain().map(|(_, (_, handle))| handle).collect();
        for handle in tasks {
            let _ = handle.await;
        }
        let runner = self.runner_task.lock().take();
        if let Some(handle) = runner {
            let _ = handle.await;
        }

        self.storage.shutdown().await;
        info!("MailboxSdk 关闭完成");
    }
}
