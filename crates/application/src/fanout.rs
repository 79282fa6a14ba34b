//! 实时扇出端口
//!
//! 由网关的连接注册表实现。投递语义是至多一次、尽力而为：
//! 断线客户端错过的事件只能通过历史回放恢复，网关不做重试。

use async_trait::async_trait;
use domain::{Room, ServerEvent, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("fanout failed: {0}")]
    Failed(String),
}

impl FanoutError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait EventFanout: Send + Sync {
    /// 把事件投递给房间内的所有连接，返回实际送达的连接数。
    async fn publish_to_room(&self, room: &Room, event: &ServerEvent)
        -> Result<usize, FanoutError>;

    /// 投递到指定用户的私有房间。
    async fn publish_to_user(
        &self,
        user: UserId,
        event: &ServerEvent,
    ) -> Result<usize, FanoutError>;

    /// 全局广播（在线/离线信号）。
    async fn broadcast_all(&self, event: &ServerEvent) -> Result<usize, FanoutError>;

    /// 该用户当前是否订阅了指定房间。
    async fn is_user_in_room(&self, user: UserId, room: &Room) -> bool;
}
