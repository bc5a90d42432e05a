//! 单飞（single-flight）请求合并与「缓存 + 刷新」观察流
//!
//! 同一个 key 的并发请求共享一个进行中的 future，完成后从表中移除。

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{DataError, DataResult, MailboxSdkError, Result};

pub struct SingleFlight<K, V>
where
    V: Clone,
{
    in_flight: Mutex<HashMap<K, Shared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    V: Clone,
{
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行或加入 key 对应的请求；`make` 只在没有进行中的请求时调用
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = make().boxed().shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let value = shared.clone().await;

        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
            in_flight.remove(&key);
        }
        value
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// 观察流被丢弃时取消后台刷新
struct AbortOnDrop(JoinHandle<DataResult<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Refresh {
    Pending(BoxFuture<'static, DataResult<()>>),
    Running(AbortOnDrop),
    Done(DataResult<()>),
}

impl Refresh {
    fn start(self) -> Self {
        match self {
            Refresh::Pending(future) => Refresh::Running(AbortOnDrop(tokio::spawn(future))),
            other => other,
        }
    }

    async fn wait(self) -> DataResult<()> {
        match self {
            Refresh::Pending(future) => future.await,
            Refresh::Running(mut guard) => (&mut guard.0)
                .await
                .unwrap_or_else(|e| Err(DataError::from(MailboxSdkError::Other(e.to_string())))),
            Refresh::Done(result) => result,
        }
    }
}

/// 缓存观察流 + 一次后台刷新。
///
/// - 缓存有值：直接发出，刷新在后台进行，写入后缓存流自然再发一次
/// - 缓存为空：等待刷新；刷新失败则发出该错误，成功则等待缓存流的下一次发射
/// - 刷新完成后缓存仍为空（例如被删除）：发出 NoDataCached
pub fn cached_with_refresh<T, R>(
    cache: BoxStream<'static, Result<Option<T>>>,
    refresh: R,
) -> BoxStream<'static, DataResult<T>>
where
    T: Send + 'static,
    R: Future<Output = DataResult<()>> + Send + 'static,
{
    let refresh = Refresh::Pending(refresh.boxed());
    stream::unfold(Some((cache, refresh)), |state| async move {
        let (mut cache, refresh) = state?;
        let mut refresh = refresh.start();
        loop {
            match cache.next().await? {
                Ok(Some(value)) => return Some((Ok(value), Some((cache, refresh)))),
                Err(e) => return Some((Err(DataError::from(e)), Some((cache, refresh)))),
                Ok(None) => {
                    if let Refresh::Done(_) = refresh {
                        return Some((Err(DataError::no_data_cached()), Some((cache, refresh))));
                    }
                    let result = refresh.wait().await;
                    if let Err(e) = &result {
                        warn!("⚠️ 缓存为空且刷新失败: {}", e);
                        let error = e.clone();
                        return Some((Err(error), Some((cache, Refresh::Done(result)))));
                    }
                    refresh = Refresh::Done(result);
                }
            }
        }
    })
    .boxed()
}

/// 将本地流的错误映射为 DataError
pub fn map_local<T: Send + 'static>(stream: BoxStream<'static, Result<T>>) -> BoxStream<'static, DataResult<T>> {
    stream.map(|item| item.map_err(DataError::from)).boxed()
}

/// 供仓库复用的单飞表
pub type SharedFlights<K> = Arc<SingleFlight<K, DataResult<()>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, usize>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let flights = flights.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    flights
                        .run("k".to_string(), || async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            calls.fetch_add(1, Ordering::SeqCst) + 1
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);

        // 完成后再次请求会重新执行
        let again = flights.run("k".to_string(), || async { 42 }).await;
        assert_eq!(again, 42);
        println!("✅ 单飞请求合并");
    }

    #[tokio::test]
    async fn empty_cache_surfaces_refresh_error() {
        let cache = stream::iter(vec![Ok::<Option<u32>, _>(None)]).boxed();
        let mut observed = cached_with_refresh(cache, async { Err(DataError::http(NetworkError::NoNetwork)) });
        let first = observed.next().await.unwrap();
        assert!(first.unwrap_err().is_offline_error());
    }

    #[tokio::test]
    async fn cached_value_is_emitted_without_waiting_for_refresh() {
        let cache = stream::iter(vec![Ok(Some(7u32))]).chain(stream::pending()).boxed();
        let mut observed = cached_with_refresh(cache, futures::future::pending());
        assert_eq!(observed.next().await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn dropping_stream_cancels_refresh() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let cache = stream::iter(vec![Ok(Some(1u32))]).chain(stream::pending()).boxed();
        let refresh = async move {
            let _tx = tx;
            futures::future::pending::<()>().await;
            Ok(())
        };

        let mut observed = cached_with_refresh(cache, refresh);
        assert_eq!(observed.next().await.unwrap().unwrap(), 1);
        drop(observed);

        // 任务被取消后 future 被丢弃，发送端随之关闭
        let closed = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
        assert!(closed.is_err());
        println!("✅ 丢弃观察流会取消后台刷新");
    }

    #[tokio::test]
    async fn stream_stays_pending_until_cache_changes() {
        let cache = stream::iter(vec![Ok(Some(1u32))]).chain(stream::pending()).boxed();
        let mut observed = tokio_test::task::spawn(cached_with_refresh(cache, async { Ok(()) }));

        let first = tokio_test::assert_ready!(observed.poll_next());
        assert_eq!(first.unwrap().unwrap(), 1);
        tokio_test::assert_pending!(observed.poll_next());
        println!("✅ 缓存未变更时流保持挂起");
    }
}
