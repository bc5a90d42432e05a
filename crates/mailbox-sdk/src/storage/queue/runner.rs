//! 任务执行器：取出到期任务、调用远端、按结果完成 / 重排 / 失败

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{now_ms, EntityKey, Job, JobKind, JobOutcome, JobQueue, RetryPolicy};
use crate::error::{DataResult, Result};
use crate::model::UserId;

/// 真正执行任务的远端接口
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, user_id: &UserId, kind: &JobKind) -> DataResult<()>;
}

/// 单轮执行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
}

pub struct JobRunner {
    queue: JobQueue,
    executor: Arc<dyn JobExecutor>,
    policy: RetryPolicy,
}

impl JobRunner {
    pub fn new(queue: JobQueue, executor: Arc<dyn JobExecutor>, policy: RetryPolicy) -> Self {
        Self {
            queue,
            executor,
            policy,
        }
    }

    /// 执行一轮所有到期任务
    pub async fn run_once(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let due = self.queue.due(now_ms())?;
        if due.is_empty() {
            return Ok(summary);
        }
        debug!("🚀 执行到期任务: {} 个", due.len());

        // 本轮内进入退避的实体，其后续任务留到下一轮
        let mut blocked: HashSet<EntityKey> = HashSet::new();
        for job in due {
            let keys = job.entity_keys();
            if keys.iter().any(|key| blocked.contains(key)) {
                blocked.extend(keys);
                continue;
            }
            if !self.queue.is_current(&job)? {
                debug!("任务已被新的变更覆盖，跳过: {} ({})", job.id, job.kind.name());
                continue;
            }
            let outcome = JobOutcome::from_result(self.executor.execute(&job.user_id, &job.kind).await);
            if matches!(outcome, JobOutcome::Retry(_)) {
                blocked.extend(keys);
            }
            self.apply(job, outcome, &mut summary)?;
        }

        if summary.failed > 0 || summary.retried > 0 {
            info!(
                "任务执行完成: succeeded={}, retried={}, failed={}",
                summary.succeeded, summary.retried, summary.failed
            );
        }
        Ok(summary)
    }

    fn apply(&self, mut job: Job, outcome: JobOutcome, summary: &mut RunSummary) -> Result<()> {
        job.attempts += 1;
        match outcome {
            JobOutcome::Success => {
                debug!("✅ 任务完成: {} ({})", job.id, job.kind.name());
                self.queue.complete(&job)?;
                summary.succeeded += 1;
            }
            JobOutcome::Retry(error) => match self.policy.next_attempt_at(job.attempts, now_ms()) {
                Some(next) => {
                    warn!(
                        "⚠️ 任务稍后重试: {} ({}), attempts={}, error={}",
                        job.id,
                        job.kind.name(),
                        job.attempts,
                        error
                    );
                    self.queue.reschedule(job, next, error)?;
                    summary.retried += 1;
                }
                None => {
                    self.queue.fail(job, format!("超过最大重试次数: {}", error))?;
                    summary.failed += 1;
                }
            },
            JobOutcome::Failure(error) => {
                self.queue.fail(job, error)?;
                summary.failed += 1;
            }
        }
        Ok(())
    }

    /// 后台周期执行，直到 token 被取消
    pub fn spawn(self: Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("任务执行器已启动, interval={:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!("⚠️ 任务执行轮次失败: {}", e);
                        }
                    }
                }
            }
            info!("任务执行器已停止");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, NetworkError};
    use crate::storage::kv::KvStore;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeExecutor {
        calls: AtomicUsize,
        results: Mutex<Vec<DataResult<()>>>,
    }

    impl FakeExecutor {
        fn new(results: Vec<DataResult<()>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                results: Mutex::new(results),
            })
        }
    }

    #[async_trait]
    impl JobExecutor for FakeExecutor {
        async fn execute(&self, _user_id: &UserId, _kind: &JobKind) -> DataResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            if results.is_empty() {
                Ok(())
            } else {
                results.remove(0)
            }
        }
    }

    async fn setup(results: Vec<DataResult<()>>, policy: RetryPolicy) -> (TempDir, JobQueue, Arc<FakeExecutor>, JobRunner) {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let executor = FakeExecutor::new(results);
        let runner = JobRunner::new(queue.clone(), executor.clone(), policy);
        (dir, queue, executor, runner)
    }

    fn enqueue(queue: &JobQueue) {
        queue
            .enqueue_chunked(
                &UserId::from("u1"),
                JobKind::MarkConversationsRead { ids: vec!["c1".into()] },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn success_completes_job() {
        let (_dir, queue, executor, runner) = setup(vec![], RetryPolicy::default()).await;
        enqueue(&queue);

        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert!(queue.pending(&UserId::from("u1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn connectivity_error_reschedules_then_gives_up() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        let offline = || Err(DataError::http(NetworkError::NoNetwork));
        let (_dir, queue, _executor, runner) = setup(vec![offline(), offline()], policy).await;
        enqueue(&queue);

        let first = runner.run_once().await.unwrap();
        assert_eq!(first.retried, 1);
        let pending = queue.pending(&UserId::from("u1")).unwrap();
        assert_eq!(pending[0].attempts, 1);

        let second = runner.run_once().await.unwrap();
        assert_eq!(second.failed, 1);
        assert!(queue.pending(&UserId::from("u1")).unwrap().is_empty());
        assert_eq!(queue.failed().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_holds_back_later_jobs_for_same_entity() {
        let policy = RetryPolicy {
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        let (_dir, queue, executor, runner) =
            setup(vec![Err(DataError::http(NetworkError::NoNetwork))], policy).await;
        let user = UserId::from("u1");
        queue
            .enqueue_chunked(
                &user,
                JobKind::AddConversationLabel {
                    ids: vec!["c1".into()],
                    label_id: "10".into(),
                },
            )
            .unwrap();
        enqueue(&queue);

        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary, RunSummary { succeeded: 0, retried: 1, failed: 0 });
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let names: Vec<&str> = queue.pending(&user).unwrap().iter().map(|job| job.kind.name()).collect();
        assert_eq!(names, vec!["add_conversation_label", "mark_conversations_read"]);

        // 后续轮次仍被退避中的任务阻塞
        assert_eq!(runner.run_once().await.unwrap(), RunSummary::default());
        println!("✅ 重试中的任务阻塞同一会话的后续任务");
    }

    #[tokio::test]
    async fn parse_error_fails_immediately() {
        let (_dir, queue, _executor, runner) = setup(
            vec![Err(DataError::http(NetworkError::Parse))],
            RetryPolicy::default(),
        )
        .await;
        enqueue(&queue);

        let summary = runner.run_once().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(queue.pending(&UserId::from("u1")).unwrap().is_empty());
        println!("✅ 解析错误直接失败");
    }
}
