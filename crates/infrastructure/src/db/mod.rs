//! Postgres 持久化

mod conversation_repository_impl;
mod message_repository_impl;

pub use conversation_repository_impl::PgConversationRepository;
pub use message_repository_impl::PgMessageRepository;

use domain::RepositoryError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 创建 PostgreSQL 连接池
pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// 统一的 sqlx 错误映射：唯一约束冲突 → Conflict，其余 → Storage。
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &error {
        if db_err.code().as_deref() == Some("23505") {
            return RepositoryError::Conflict;
        }
    }
    RepositoryError::storage(error.to_string())
}

/// JSON 列的序列化辅助
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::storage(e.to_string()))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    raw: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::storage(e.to_string()))
}
