//! 会话内写入串行化
//!
//! 单一权威的消息存储按到达顺序串行化同一会话的写入，
//! 不同会话之间互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use domain::ConversationId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct ConversationSequencer {
    locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话级写锁。守卫存活期间同会话的其他写入排队等待。
    pub async fn acquire(&self, conversation_id: ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_same_conversation_only() {
        let sequencer = ConversationSequencer::new();
        let a = ConversationId::generate();
        let b = ConversationId::generate();

        let guard_a = sequencer.acquire(a).await;
        // 不同会话的锁互不阻塞
        let _guard_b = sequencer.acquire(b).await;

        let sequencer = Arc::new(sequencer);
        let contended = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                let _guard = sequencer.acquire(a).await;
            })
        };

        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard_a);
        contended.await.unwrap();
    }
}
