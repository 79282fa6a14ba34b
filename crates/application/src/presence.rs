//! 在线状态端口
//!
//! 系统级的在线/离线信号，最终一致、尽力而为。

use async_trait::async_trait;
use domain::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence backend failed: {0}")]
    Backend(String),
}

impl PresenceError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn mark_online(&self, user: UserId) -> Result<(), PresenceError>;

    async fn mark_offline(&self, user: UserId) -> Result<(), PresenceError>;

    async fn is_online(&self, user: UserId) -> Result<bool, PresenceError>;

    async fn online_users(&self) -> Result<Vec<UserId>, PresenceError>;
}
