//! 持久化任务队列 - 本地变更先落库，再由后台 runner 同步到服务端
//!
//! 任务存放在 sled 的 `jobs` Tree 中，键为 `job:{id}`；
//! 永久失败的任务移入 `failed:{id}` 便于排查。
//!
//! 执行顺序按入队序号 `seq`。新任务入队时，同一目标上更早的任务中与之重叠的 ID 被移除，
//! 因此同一实体在同一目标上最多只有一个待执行任务，且总是最后一次的意图。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::model::UserId;
use crate::storage::kv::{KvStore, KvTree};

pub mod job;
pub mod retry_policy;
pub mod runner;

pub use job::{EntityKey, Job, JobKind, JobOutcome, MAX_IDS_PER_JOB};
pub use retry_policy::RetryPolicy;
pub use runner::{JobExecutor, JobRunner, RunSummary};

const JOB_TREE: &str = "jobs";
const JOB_PREFIX: &str = "job:";
const FAILED_PREFIX: &str = "failed:";
const SEQ_KEY: &str = "seq";

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    tree: KvTree,
    /// 串行化「读 - 改 - 写」
    lock: Arc<Mutex<()>>,
}

impl JobQueue {
    pub fn open(kv: &KvStore) -> Result<Self> {
        Ok(Self {
            tree: kv.named_tree(JOB_TREE)?,
            lock: Arc::new(Mutex::new(())),
        })
    }

    fn key(id: &str) -> String {
        format!("{}{}", JOB_PREFIX, id)
    }

    fn failed_key(id: &str) -> String {
        format!("{}{}", FAILED_PREFIX, id)
    }

    fn next_seq(&self) -> Result<u64> {
        let next = self.tree.get::<u64>(SEQ_KEY)?.unwrap_or(0) + 1;
        self.tree.set(SEQ_KEY, &next)?;
        Ok(next)
    }

    /// 入队，返回写入的任务（带序号）。
    ///
    /// 同一用户、同一目标上更早的任务去掉与新任务重叠的 ID，ID 全部被覆盖的任务直接删除；
    /// 相同 ID 的任务重新入队会排到队尾并重置重试状态。
    pub fn enqueue(&self, mut job: Job) -> Result<Job> {
        let _guard = self.lock.lock();
        let new_ids: HashSet<&String> = job.kind.ids().iter().collect();

        let mut superseded = 0;
        for (old_key, old) in self.tree.scan_prefix::<Job>(JOB_PREFIX)? {
            if old.user_id != job.user_id || !job.kind.supersedes(&old.kind) {
                continue;
            }
            let remaining: Vec<String> = old
                .kind
                .ids()
                .iter()
                .filter(|id| !new_ids.contains(id))
                .cloned()
                .collect();
            if remaining.len() == old.kind.ids().len() {
                continue;
            }
            self.tree.remove(&old_key)?;
            superseded += 1;
            if !remaining.is_empty() {
                let kind = old.kind.with_ids(remaining);
                let narrowed = Job {
                    id: Job::job_id(&old.user_id, &kind),
                    kind,
                    ..old
                };
                self.tree.set(&Self::key(&narrowed.id), &narrowed)?;
            }
        }

        job.seq = self.next_seq()?;
        self.tree.set(&Self::key(&job.id), &job)?;
        debug!(
            "任务入队: {} ({}), ids={}, seq={}, 覆盖 {} 个旧任务",
            job.id,
            job.kind.name(),
            job.kind.ids().len(),
            job.seq,
            superseded
        );
        Ok(job)
    }

    /// 按 100 个 ID 一块拆分后入队，返回各块任务 ID
    pub fn enqueue_chunked(&self, user_id: &UserId, kind: JobKind) -> Result<Vec<String>> {
        let now = now_ms();
        let mut ids = Vec::new();
        for chunk in kind.chunked() {
            let job = self.enqueue(Job::new(user_id.clone(), chunk, now))?;
            ids.push(job.id);
        }
        Ok(ids)
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        self.tree.get(&Self::key(id))
    }

    /// 队列中仍是这一代任务（未被覆盖或重新入队）
    pub fn is_current(&self, job: &Job) -> Result<bool> {
        Ok(self.get(&job.id)?.is_some_and(|stored| stored.seq == job.seq))
    }

    fn all(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .tree
            .scan_prefix::<Job>(JOB_PREFIX)?
            .into_iter()
            .map(|(_, job)| job)
            .collect();
        jobs.sort_by(|a, b| {
            a.seq
                .cmp(&b.seq)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    /// 到期（next_attempt_at <= now）的任务，按入队顺序。
    ///
    /// 某实体有更早的任务尚在退避中时，该实体之后的任务暂不执行。
    pub fn due(&self, now_ms: i64) -> Result<Vec<Job>> {
        let mut blocked: HashSet<EntityKey> = HashSet::new();
        let mut due = Vec::new();
        for job in self.all()? {
            let keys = job.entity_keys();
            if job.next_attempt_at > now_ms || keys.iter().any(|key| blocked.contains(key)) {
                blocked.extend(keys);
            } else {
                due.push(job);
            }
        }
        Ok(due)
    }

    pub fn pending(&self, user_id: &UserId) -> Result<Vec<Job>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|job| &job.user_id == user_id)
            .collect())
    }

    /// 完成；任务在执行期间被覆盖时不影响新任务
    pub fn complete(&self, job: &Job) -> Result<()> {
        let _guard = self.lock.lock();
        if self.is_current(job)? {
            self.tree.remove(&Self::key(&job.id))?;
        } else {
            debug!("任务执行期间已被覆盖: {} ({})", job.id, job.kind.name());
        }
        Ok(())
    }

    pub fn reschedule(&self, mut job: Job, next_attempt_at: i64, error: String) -> Result<()> {
        let _guard = self.lock.lock();
        if !self.is_current(&job)? {
            debug!("任务已被覆盖，不再重试: {} ({})", job.id, job.kind.name());
            return Ok(());
        }
        job.next_attempt_at = next_attempt_at;
        job.last_error = Some(error);
        self.tree.set(&Self::key(&job.id), &job)
    }

    /// 永久失败：移出待执行队列
    pub fn fail(&self, mut job: Job, error: String) -> Result<()> {
        let _guard = self.lock.lock();
        if !self.is_current(&job)? {
            debug!("任务已被覆盖，忽略失败结果: {} ({})", job.id, job.kind.name());
            return Ok(());
        }
        error!(
            "❌ 任务永久失败: {} ({}), attempts={}, error={}",
            job.id,
            job.kind.name(),
            job.attempts,
            error
        );
        self.tree.remove(&Self::key(&job.id))?;
        job.last_error = Some(error);
        self.tree.set(&Self::failed_key(&job.id), &job)
    }

    pub fn failed(&self) -> Result<Vec<Job>> {
        Ok(self
            .tree
            .scan_prefix::<Job>(FAILED_PREFIX)?
            .into_iter()
            .map(|(_, job)| job)
            .collect())
    }

    /// 删除某用户的全部任务（登出时），包括失败记录；返回丢弃的待执行任务数
    pub fn remove_user(&self, user_id: &UserId) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut removed = 0;
        for job in self.all()? {
            if &job.user_id == user_id {
                self.tree.remove(&Self::key(&job.id))?;
                removed += 1;
            }
        }
        for job in self.failed()? {
            if &job.user_id == user_id {
                self.tree.remove(&Self::failed_key(&job.id))?;
            }
        }
        if removed > 0 {
            info!("已丢弃用户 {} 的 {} 个待执行任务", user_id, removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn enqueue_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");
        let kind = JobKind::AddMessageLabel {
            ids: vec!["m1".into()],
            label_id: LabelId::from("10"),
        };

        let first = queue.enqueue_chunked(&user, kind.clone()).unwrap();
        let second = queue.enqueue_chunked(&user, kind).unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.pending(&user).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn due_respects_schedule_and_fail_moves_job() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");
        let job = queue
            .enqueue(Job::new(user.clone(), JobKind::MarkMessagesRead { ids: vec!["m1".into()] }, 1_000))
            .unwrap();

        assert_eq!(queue.due(1_000).unwrap().len(), 1);
        queue.reschedule(job.clone(), 5_000, "NoNetwork".into()).unwrap();
        assert!(queue.due(1_000).unwrap().is_empty());
        assert_eq!(queue.due(5_000).unwrap().len(), 1);

        let job = queue.get(&job.id).unwrap().unwrap();
        queue.fail(job.clone(), "Parse".into()).unwrap();
        assert!(queue.pending(&user).unwrap().is_empty());
        assert_eq!(queue.failed().unwrap()[0].id, job.id);
        println!("✅ 任务调度与失败处理正确");
    }

    #[tokio::test]
    async fn remove_user_only_drops_that_user() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let kind = JobKind::MarkConversationsRead { ids: vec!["c1".into()] };
        queue.enqueue_chunked(&UserId::from("u1"), kind.clone()).unwrap();
        queue.enqueue_chunked(&UserId::from("u2"), kind).unwrap();

        assert_eq!(queue.remove_user(&UserId::from("u1")).unwrap(), 1);
        assert_eq!(queue.pending(&UserId::from("u2")).unwrap().len(), 1);
    }

    fn add_label(ids: &[&str]) -> JobKind {
        JobKind::AddConversationLabel {
            ids: ids.iter().map(|id| id.to_string()).collect(),
            label_id: LabelId::from("10"),
        }
    }

    fn remove_label(ids: &[&str]) -> JobKind {
        JobKind::RemoveConversationLabel {
            ids: ids.iter().map(|id| id.to_string()).collect(),
            label_id: LabelId::from("10"),
        }
    }

    #[tokio::test]
    async fn last_intent_wins_on_same_label() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");

        queue.enqueue_chunked(&user, add_label(&["c1"])).unwrap();
        queue.enqueue_chunked(&user, remove_label(&["c1"])).unwrap();
        queue.enqueue_chunked(&user, add_label(&["c1"])).unwrap();

        let pending = queue.pending(&user).unwrap();
        let names: Vec<&str> = pending.iter().map(|job| job.kind.name()).collect();
        assert_eq!(names, vec!["add_conversation_label"]);
        assert_eq!(queue.due(now_ms()).unwrap().last().map(|job| job.kind.name()), Some("add_conversation_label"));
        println!("✅ 同一标签反复增删只保留最后一次意图");
    }

    #[tokio::test]
    async fn overlapping_ids_are_narrowed_not_dropped() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");

        queue.enqueue_chunked(&user, add_label(&["c1", "c2"])).unwrap();
        queue.enqueue_chunked(&user, remove_label(&["c2"])).unwrap();
        // 不同目标互不影响
        queue
            .enqueue_chunked(&user, JobKind::MarkConversationsRead { ids: vec!["c1".into()] })
            .unwrap();

        let pending = queue.pending(&user).unwrap();
        let kinds: Vec<JobKind> = pending.into_iter().map(|job| job.kind).collect();
        assert_eq!(
            kinds,
            vec![
                add_label(&["c1"]),
                remove_label(&["c2"]),
                JobKind::MarkConversationsRead { ids: vec!["c1".into()] },
            ]
        );
    }

    #[tokio::test]
    async fn entity_waits_behind_job_in_backoff() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");

        let first = queue.enqueue(Job::new(user.clone(), add_label(&["c1"]), 1_000)).unwrap();
        queue
            .enqueue(Job::new(user.clone(), JobKind::MarkConversationsRead { ids: vec!["c1".into()] }, 1_000))
            .unwrap();
        queue
            .enqueue(Job::new(user.clone(), JobKind::MarkConversationsRead { ids: vec!["c2".into()] }, 1_000))
            .unwrap();
        // 消息 ID 与会话 ID 不在同一命名空间
        queue
            .enqueue(Job::new(user.clone(), JobKind::MarkMessagesRead { ids: vec!["c1".into()] }, 1_000))
            .unwrap();

        queue.reschedule(first, 9_000, "NoNetwork".into()).unwrap();
        let due: Vec<Vec<String>> = queue
            .due(2_000)
            .unwrap()
            .into_iter()
            .map(|job| job.kind.ids().to_vec())
            .collect();
        assert_eq!(due, vec![vec!["c2".to_string()], vec!["c1".to_string()]]);
        assert_eq!(queue.due(9_000).unwrap().len(), 4);
        println!("✅ 退避中的任务阻塞同一实体的后续任务");
    }

    #[tokio::test]
    async fn stale_generation_does_not_touch_requeued_job() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let user = UserId::from("u1");

        let running = queue.enqueue(Job::new(user.clone(), add_label(&["c1"]), 1_000)).unwrap();
        let requeued = queue.enqueue(Job::new(user.clone(), add_label(&["c1"]), 2_000)).unwrap();
        assert_eq!(running.id, requeued.id);
        assert!(requeued.seq > running.seq);
        assert!(!queue.is_current(&running).unwrap());

        queue.reschedule(running.clone(), 50_000, "NoNetwork".into()).unwrap();
        queue.complete(&running).unwrap();
        queue.fail(running, "Parse".into()).unwrap();

        let stored = queue.get(&requeued.id).unwrap().unwrap();
        assert_eq!(stored, requeued);
        assert!(queue.failed().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_user_clears_failed_entries() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let queue = JobQueue::open(&kv).unwrap();
        let kind = JobKind::MarkMessagesUnread { ids: vec!["m1".into()] };
        let u1 = queue.enqueue(Job::new(UserId::from("u1"), kind.clone(), 1_000)).unwrap();
        let u2 = queue.enqueue(Job::new(UserId::from("u2"), kind, 1_000)).unwrap();
        queue.fail(u1, "Parse".into()).unwrap();
        queue.fail(u2, "Parse".into()).unwrap();

        assert_eq!(queue.remove_user(&UserId::from("u1")).unwrap(), 0);
        let failed = queue.failed().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].user_id, UserId::from("u2"));
    }
}
