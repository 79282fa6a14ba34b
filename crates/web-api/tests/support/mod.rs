//! 集成测试支撑：在随机端口拉起完整服务

use std::net::SocketAddr;
use std::sync::Arc;

use application::memory::{
    InMemoryBlobStorage, InMemoryConversationRepository, InMemoryMessageRepository,
    InMemoryPresenceStore,
};
use application::presence::PresenceStore;
use application::services::{
    ConversationService, ConversationServiceDependencies, MessageService,
    MessageServiceDependencies,
};
use application::{AttachmentPipeline, NotificationFanout, SendRateLimiter, SystemClock};
use config::{AttachmentConfig, JwtConfig};
use domain::UserId;
use infrastructure::{ImageProcessor, InMemoryConnectionRegistry};
use web_api::{router, AppState, JwtService};

pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub client: reqwest::Client,
}

pub async fn spawn_server() -> TestServer {
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let storage = Arc::new(InMemoryBlobStorage::default());
    let registry = Arc::new(InMemoryConnectionRegistry::new());
    let presence = Arc::new(InMemoryPresenceStore::new());
    let clock = Arc::new(SystemClock);

    // 小尺寸上限便于在测试里触发 413
    let attachment_config = AttachmentConfig {
        max_attachment_bytes: 1024,
        max_image_bytes: 512,
        ..AttachmentConfig::default()
    };

    let pipeline = Arc::new(AttachmentPipeline::new(
        storage,
        Arc::new(ImageProcessor::new(
            attachment_config.image_max_dimension,
            attachment_config.image_quality,
        )),
        attachment_config,
        clock.clone(),
    ));
    let notifications = Arc::new(NotificationFanout::new(
        registry.clone(),
        presence.clone() as Arc<dyn PresenceStore>,
    ));

    let conversation_service = Arc::new(ConversationService::new(
        ConversationServiceDependencies {
            conversation_repository: conversations.clone(),
            clock: clock.clone(),
        },
    ));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        conversation_repository: conversations,
        message_repository: messages,
        pipeline,
        fanout: registry.clone(),
        notifications,
        rate_limiter: Arc::new(SendRateLimiter::with_defaults()),
        clock,
    }));

    let jwt = Arc::new(JwtService::new(&JwtConfig {
        secret: "integration-test-secret-key-at-least-32-chars".to_string(),
    }));

    let state = AppState::new(
        conversation_service,
        message_service,
        registry,
        presence,
        jwt.clone(),
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        jwt,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    pub fn token_for(&self, user: UserId) -> String {
        let exp = chrono::Utc::now().timestamp() + 3600;
        self.jwt.generate_token(user.into(), exp).unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }
}
