//! 未读计数仓库

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use crate::error::{DataError, DataResult};
use crate::local::UnreadCountLocalDataSource;
use crate::model::{UnreadCount, UnreadCounter, UserId};
use crate::remote::UnreadCountRemoteDataSource;

fn to_counters(stream: BoxStream<'static, crate::error::Result<Vec<UnreadCount>>>) -> BoxStream<'static, DataResult<Vec<UnreadCounter>>> {
    stream
        .map(|item| {
            item.map(|counts| counts.iter().map(UnreadCounter::from).collect())
                .map_err(DataError::from)
        })
        .boxed()
}

pub struct UnreadCountRepository {
    local: Arc<dyn UnreadCountLocalDataSource>,
    remote: Arc<dyn UnreadCountRemoteDataSource>,
}

impl UnreadCountRepository {
    pub fn new(local: Arc<dyn UnreadCountLocalDataSource>, remote: Arc<dyn UnreadCountRemoteDataSource>) -> Self {
        Self { local, remote }
    }

    pub fn observe_message_counters(&self, user_id: &UserId) -> BoxStream<'static, DataResult<Vec<UnreadCounter>>> {
        to_counters(self.local.observe_message_counters(user_id))
    }

    pub fn observe_conversation_counters(&self, user_id: &UserId) -> BoxStream<'static, DataResult<Vec<UnreadCounter>>> {
        to_counters(self.local.observe_conversation_counters(user_id))
    }

    /// 从远端拉取两类计数并覆盖本地
    pub async fn refresh(&self, user_id: &UserId) -> DataResult<()> {
        let messages = self.remote.get_message_counters(user_id).await?;
        let conversations = self.remote.get_conversation_counters(user_id).await?;
        debug!(
            "未读计数已拉取: user={}, messages={}, conversations={}",
            user_id,
            messages.len(),
            conversations.len()
        );
        self.local.save_message_counters(user_id, messages).await?;
        self.local.save_conversation_counters(user_id, conversations).await?;
        Ok(())
    }
}
