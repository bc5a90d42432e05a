//! KV 存储模块 - 基于 sled 的键值存储
//!
//! - 每个用户一个 Tree（用户隔离的命名空间）
//! - 另有按名称打开的共享 Tree（如任务队列）
//! - 值统一以 JSON 序列化

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use tracing::{info, warn};

use crate::error::{MailboxSdkError, Result};
use crate::model::UserId;

/// 单个 Tree 的 JSON 读写封装
#[derive(Debug, Clone)]
pub struct KvTree {
    tree: Tree,
}

impl KvTree {
    pub fn set<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| MailboxSdkError::Serialization(format!("序列化 KV 值失败: {}", e)))?;
        self.tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.tree.get(key.as_bytes())? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    MailboxSdkError::Serialization(format!("反序列化 KV 值失败: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.tree.remove(key.as_bytes())?.is_some())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.tree.contains_key(key.as_bytes())?)
    }

    /// 按前缀扫描；无法解析的条目跳过并记录警告
    pub fn scan_prefix<V: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, V)>> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = entry?;
            let key = String::from_utf8_lossy(&key).to_string();
            match serde_json::from_slice::<V>(&bytes) {
                Ok(value) => out.push((key, value)),
                Err(e) => warn!("跳过无法解析的 KV 条目: key={}, error={}", key, e),
            }
        }
        Ok(out)
    }

    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.tree.scan_prefix(prefix.as_bytes()).keys() {
            self.tree.remove(key?)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}

/// KV 存储组件
#[derive(Debug)]
pub struct KvStore {
    base_path: PathBuf,
    db: Db,
    user_trees: RwLock<HashMap<UserId, KvTree>>,
}

impl KvStore {
    /// 打开 `{base_path}/kv`；刚释放的锁可能尚未归还，带退避重试
    pub async fn open(base_path: &Path) -> Result<Arc<Self>> {
        let kv_path = base_path.join("kv");
        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| MailboxSdkError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        const MAX_OPEN_RETRIES: u32 = 5;
        const RETRY_DELAY_MS: u64 = 200;
        let mut attempt = 0;
        let db = loop {
            match sled::open(&kv_path) {
                Ok(db) => break db,
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    attempt += 1;
                    if !is_lock || attempt >= MAX_OPEN_RETRIES {
                        return Err(MailboxSdkError::KvStore(format!("打开 sled 数据库失败: {}", e)));
                    }
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS << attempt)).await;
                }
            }
        };

        info!("✅ KV 存储已打开: {}", kv_path.display());
        Ok(Arc::new(Self {
            base_path: base_path.to_path_buf(),
            db,
            user_trees: RwLock::new(HashMap::new()),
        }))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 用户专属 Tree（首次访问时打开）
    pub fn user_tree(&self, uid: &UserId) -> Result<KvTree> {
        if let Some(tree) = self.user_trees.read().get(uid) {
            return Ok(tree.clone());
        }
        let tree = KvTree {
            tree: self.db.open_tree(format!("user_{}", uid))?,
        };
        self.user_trees.write().insert(uid.clone(), tree.clone());
        Ok(tree)
    }

    /// 按名称打开共享 Tree
    pub fn named_tree(&self, name: &str) -> Result<KvTree> {
        Ok(KvTree {
            tree: self.db.open_tree(name)?,
        })
    }

    /// 删除用户全部 KV 数据
    pub fn cleanup_user_data(&self, uid: &UserId) -> Result<()> {
        self.user_trees.write().remove(uid);
        self.db.drop_tree(format!("user_{}", uid))?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cursor {
        event_id: String,
    }

    #[tokio::test]
    async fn user_trees_are_isolated() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let a = kv.user_tree(&UserId::from("a")).unwrap();
        let b = kv.user_tree(&UserId::from("b")).unwrap();

        a.set("cursor", &Cursor { event_id: "e1".into() }).unwrap();
        assert_eq!(a.get::<Cursor>("cursor").unwrap(), Some(Cursor { event_id: "e1".into() }));
        assert_eq!(b.get::<Cursor>("cursor").unwrap(), None);

        kv.cleanup_user_data(&UserId::from("a")).unwrap();
        let a = kv.user_tree(&UserId::from("a")).unwrap();
        assert_eq!(a.get::<Cursor>("cursor").unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_scan_and_remove() {
        let dir = TempDir::new().unwrap();
        let kv = KvStore::open(dir.path()).await.unwrap();
        let tree = kv.named_tree("jobs").unwrap();
        tree.set("job:1", &1u32).unwrap();
        tree.set("job:2", &2u32).unwrap();
        tree.set("other", &3u32).unwrap();

        let jobs: Vec<(String, u32)> = tree.scan_prefix("job:").unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(tree.remove_prefix("job:").unwrap(), 2);
        assert!(tree.contains("other").unwrap());
    }
}
