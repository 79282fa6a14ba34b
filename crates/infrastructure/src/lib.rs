//! 基础设施层
//!
//! 应用层端口的具体适配器：Postgres 仓储、本地磁盘对象存储、
//! 图片转码、网关连接注册表，以及 Redis 在线状态。

pub mod db;
pub mod media;
pub mod presence;
pub mod registry;
pub mod storage;

pub use db::{create_pg_pool, PgConversationRepository, PgMessageRepository};
pub use media::ImageProcessor;
pub use presence::RedisPresenceStore;
pub use registry::{ConnectionId, InMemoryConnectionRegistry};
pub use storage::LocalDiskBlobStorage;
