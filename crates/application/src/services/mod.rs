//! 用例服务

mod conversation_service;
mod message_service;

pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, CreateOrGetRequest, ListConversationsQuery,
};
pub use message_service::{
    MessageService, MessageServiceDependencies, SendFileCommand, SendPaymentRequestCommand,
    SendTextCommand, SendVoiceCommand,
};

#[cfg(test)]
mod conversation_service_tests;
