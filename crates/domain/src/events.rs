//! 实时事件词汇表
//!
//! 网关与客户端之间的协议帧定义，以及扇出作用域（房间）。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{ConversationId, MessageId, OrderId, Timestamp, UserId};

/// 扇出作用域：按会话、按订单、按用户。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Room {
    Conversation { id: ConversationId },
    Order { id: OrderId },
    User { id: UserId },
}

impl Room {
    pub fn conversation(id: ConversationId) -> Self {
        Self::Conversation { id }
    }

    pub fn order(id: OrderId) -> Self {
        Self::Order { id }
    }

    pub fn user(id: UserId) -> Self {
        Self::User { id }
    }
}

/// 客户端发给网关的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation { conversation_id: ConversationId },
    LeaveConversation { conversation_id: ConversationId },
    JoinOrder { order_id: OrderId },
    LeaveOrder { order_id: OrderId },
    TypingStart { conversation_id: ConversationId },
    TypingStop { conversation_id: ConversationId },
    Ping,
}

/// 网关发给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 消息被存储接受后立即向会话房间广播
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
    },
    /// 定向通知：参与者在线但未订阅该会话房间
    MessageNotification {
        conversation_id: ConversationId,
        sender: Option<UserId>,
        preview: String,
        sent_at: Timestamp,
    },
    /// 瞬态输入提示，后写覆盖，不持久化
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserStopTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    /// 尽力而为的全局在线广播
    UserOnline { user_id: UserId },
    UserOffline {
        user_id: UserId,
        last_seen: Timestamp,
    },
    MessageRead {
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: UserId,
    },
    MessageEdited {
        conversation_id: ConversationId,
        message: Message,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    ReactionUpdated {
        conversation_id: ConversationId,
        message: Message,
    },
    Pong,
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_uses_snake_case_tags() {
        let id = ConversationId::generate();
        let json = format!(
            r#"{{"type":"join_conversation","conversation_id":"{}"}}"#,
            id
        );
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, ClientEvent::JoinConversation { conversation_id: id });

        let ping: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientEvent::Ping);
    }

    #[test]
    fn malformed_client_event_fails_to_parse() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"launch_missiles"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn server_event_round_trips() {
        let event = ServerEvent::UserOnline {
            user_id: UserId::generate(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"user_online""#));
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
