use std::sync::Arc;

use application::presence::PresenceStore;
use application::services::{ConversationService, MessageService};
use infrastructure::InMemoryConnectionRegistry;

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
    pub message_service: Arc<MessageService>,
    pub registry: Arc<InMemoryConnectionRegistry>,
    pub presence: Arc<dyn PresenceStore>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        conversation_service: Arc<ConversationService>,
        message_service: Arc<MessageService>,
        registry: Arc<InMemoryConnectionRegistry>,
        presence: Arc<dyn PresenceStore>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            conversation_service,
            message_service,
            registry,
            presence,
            jwt_service,
        }
    }
}
