//! Redis 在线状态
//!
//! 用 Redis Set 维护系统级在线用户集合，供多实例部署共享。
//! 单实例部署使用应用层的内存实现即可。

use std::sync::Arc;

use application::presence::{PresenceError, PresenceStore};
use async_trait::async_trait;
use domain::UserId;
use uuid::Uuid;

/// 全局在线集合的键
const ONLINE_SET_KEY: &str = "presence:online";

/// 兜底过期：网关崩溃后残留的在线标记一天内自愈
const PRESENCE_TTL_SECONDS: i64 = 86400;

pub struct RedisPresenceStore {
    redis_client: Arc<redis::Client>,
}

impl RedisPresenceStore {
    pub fn new(redis_client: Arc<redis::Client>) -> Self {
        Self { redis_client }
    }

    pub fn connect(url: &str) -> Result<Self, PresenceError> {
        let client = redis::Client::open(url)
            .map_err(|e| PresenceError::backend(format!("Redis connection failed: {e}")))?;
        Ok(Self::new(Arc::new(client)))
    }

    async fn get_connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, PresenceError> {
        self.redis_client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PresenceError::backend(format!("Redis connection failed: {e}")))
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn mark_online(&self, user: UserId) -> Result<(), PresenceError> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::pipe()
            .sadd(ONLINE_SET_KEY, user.to_string())
            .expire(ONLINE_SET_KEY, PRESENCE_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(|e| PresenceError::backend(format!("Redis operation failed: {e}")))?;

        tracing::debug!(user_id = %user, "presence online");
        Ok(())
    }

    async fn mark_offline(&self, user: UserId) -> Result<(), PresenceError> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SREM")
            .arg(ONLINE_SET_KEY)
            .arg(user.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| PresenceError::backend(format!("Redis operation failed: {e}")))?;

        tracing::debug!(user_id = %user, "presence offline");
        Ok(())
    }

    async fn is_online(&self, user: UserId) -> Result<bool, PresenceError> {
        let mut conn = self.get_connection().await?;

        let online: bool = redis::cmd("SISMEMBER")
            .arg(ONLINE_SET_KEY)
            .arg(user.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| PresenceError::backend(format!("Redis operation failed: {e}")))?;

        Ok(online)
    }

    async fn online_users(&self) -> Result<Vec<UserId>, PresenceError> {
        let mut conn = self.get_connection().await?;

        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(ONLINE_SET_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|e| PresenceError::backend(format!("Redis operation failed: {e}")))?;

        let user_ids: Result<Vec<UserId>, _> = members
            .into_iter()
            .map(|s| s.parse::<Uuid>().map(UserId::from))
            .collect();

        user_ids.map_err(|e| PresenceError::backend(format!("Invalid UUID in Redis: {e}")))
    }
}
