//! 主应用程序入口
//!
//! 组装消息子系统并启动 Axum 服务。

use std::sync::Arc;

use application::{
    AttachmentPipeline, NotificationFanout, SendRateLimiter, SystemClock,
    memory::InMemoryPresenceStore,
    presence::PresenceStore,
    services::{
        ConversationService, ConversationServiceDependencies, MessageService,
        MessageServiceDependencies,
    },
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, ImageProcessor, InMemoryConnectionRegistry, LocalDiskBlobStorage,
    PgConversationRepository, PgMessageRepository, RedisPresenceStore,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 加载并验证配置
    let config = AppConfig::from_env_with_defaults();
    config.validate()?;

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储
    let conversation_repository = Arc::new(PgConversationRepository::new(pg_pool.clone()));
    let message_repository = Arc::new(PgMessageRepository::new(pg_pool));

    // 附件摄取管道：本地磁盘存储 + 图片转码
    let clock = Arc::new(SystemClock);
    let storage = Arc::new(LocalDiskBlobStorage::new(
        &config.attachments.storage_root,
        &config.attachments.public_base_url,
    ));
    let transcoder = Arc::new(ImageProcessor::new(
        config.attachments.image_max_dimension,
        config.attachments.image_quality,
    ));
    let pipeline = Arc::new(AttachmentPipeline::new(
        storage,
        transcoder,
        config.attachments.clone(),
        clock.clone(),
    ));

    // 网关连接注册表与在线状态
    let registry = Arc::new(InMemoryConnectionRegistry::new());
    let presence: Arc<dyn PresenceStore> = match &config.redis.url {
        Some(url) => {
            tracing::info!("使用 Redis 在线状态");
            Arc::new(RedisPresenceStore::connect(url)?)
        }
        None => Arc::new(InMemoryPresenceStore::new()),
    };
    let notifications = Arc::new(NotificationFanout::new(registry.clone(), presence.clone()));

    // 应用层服务
    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversation_repository: conversation_repository.clone(),
            clock: clock.clone(),
        },
    ));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        conversation_repository,
        message_repository,
        pipeline,
        fanout: registry.clone(),
        notifications,
        rate_limiter: Arc::new(SendRateLimiter::with_defaults()),
        clock,
    }));

    let jwt_service = Arc::new(JwtService::new(&config.jwt));
    let state = AppState::new(
        conversation_service,
        message_service,
        registry,
        presence,
        jwt_service,
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("消息服务启动在 http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
