//! 事件管理器 - 拉取事件批次、分发给监听器并推进游标
//!
//! 一个批次内所有监听器的条目在同一个写事务中应用：要么全部生效，要么全部不生效。
//! 游标只在批次提交成功后写入，失败的批次下一轮会重新拉取。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cursor_store::EventCursorStore;
use super::envelope::{EventEnvelope, EventItem};
use super::listener::EventListener;
use crate::error::Result;
use crate::events::Table;
use crate::model::UserId;
use crate::remote::EventRemoteDataSource;
use crate::storage::StorageManager;

pub struct EventManager {
    storage: Arc<StorageManager>,
    remote: Arc<dyn EventRemoteDataSource>,
    listeners: Vec<Arc<dyn EventListener>>,
    cursor: EventCursorStore,
}

impl EventManager {
    pub fn new(
        storage: Arc<StorageManager>,
        remote: Arc<dyn EventRemoteDataSource>,
        mut listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        // 稳定排序：同序者保持注册顺序
        listeners.sort_by_key(|l| l.order());
        let cursor = EventCursorStore::new(storage.kv().clone());
        Self {
            storage,
            remote,
            listeners,
            cursor,
        }
    }

    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub fn cursor(&self) -> &EventCursorStore {
        &self.cursor
    }

    /// 处理一个事件批次，返回应用的条目数
    pub async fn process(&self, user_id: &UserId, envelope: &EventEnvelope) -> Result<usize> {
        if envelope.refresh {
            warn!("⚠️ 服务端要求全量刷新: user={}, event={}", user_id, envelope.event_id);
            for listener in &self.listeners {
                listener.reset_all(user_id).await?;
            }
            self.cursor.set(user_id, &envelope.event_id)?;
            return Ok(0);
        }

        let batches: Vec<(Arc<dyn EventListener>, Vec<EventItem>)> = self
            .listeners
            .iter()
            .filter_map(|l| l.deserialize(envelope).map(|items| (l.clone(), items)))
            .collect();
        let count: usize = batches.iter().map(|(_, items)| items.len()).sum();

        if !batches.is_empty() {
            let mut tables: Vec<Table> = Vec::new();
            for (listener, _) in &batches {
                for table in listener.tables() {
                    if !tables.contains(table) {
                        tables.push(*table);
                    }
                }
            }
            let user = user_id.clone();
            self.storage
                .write(user_id, &tables, move |tx| {
                    for (listener, items) in &batches {
                        debug!("应用事件: listener={}, count={}", listener.name(), items.len());
                        listener.apply(tx, &user, items)?;
                    }
                    Ok(())
                })
                .await?;
        }

        self.cursor.set(user_id, &envelope.event_id)?;
        debug!("事件批次已处理: user={}, event={}, items={}", user_id, envelope.event_id, count);
        Ok(count)
    }

    /// 拉取并处理直到没有更多事件；首次同步只记录最新事件 ID
    pub async fn poll_once(&self, user_id: &UserId) -> Result<usize> {
        let Some(mut since) = self.cursor.get(user_id)? else {
            let latest = self.remote.get_latest_event_id(user_id).await?;
            self.cursor.set(user_id, &latest)?;
            info!("🚀 事件游标初始化: user={}, event={}", user_id, latest);
            return Ok(0);
        };

        let mut total = 0;
        loop {
            let envelope = self.remote.get_events(user_id, &since).await?;
            total += self.process(user_id, &envelope).await?;
            since = envelope.event_id.clone();
            if !envelope.more {
                break;
            }
        }
        if total > 0 {
            info!("✅ 增量同步完成: user={}, items={}", user_id, total);
        }
        Ok(total)
    }

    /// 周期拉取，直到 token 取消
    pub fn start(self: Arc<Self>, user_id: UserId, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("事件轮询已启动: user={}, interval={:?}", user_id, interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_once(&user_id).await {
                            warn!("⚠️ 事件轮询失败: user={}, error={}", user_id, e);
                        }
                    }
                }
            }
            info!("事件轮询已停止: user={}", user_id);
        })
    }
}
