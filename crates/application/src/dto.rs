//! 对外数据传输对象

use domain::{
    Attachment, Conversation, ConversationId, ConversationKind, ConversationStatus, EditState,
    LastMessage, Message, MessageId, MessageKind, MessagePayload, MessageStatus, Reaction,
    ReadReceipt, Timestamp, UserId,
};
use serde::Serialize;

/// 页码分页响应包络
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// 会话视图，未读数按请求方参与者展开。
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDto {
    pub id: ConversationId,
    pub participants: Vec<UserId>,
    pub order_id: Option<domain::OrderId>,
    pub gig_id: Option<domain::GigId>,
    pub kind: ConversationKind,
    pub subject: Option<String>,
    pub status: ConversationStatus,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub total_messages: u64,
    pub last_activity: Timestamp,
    pub created_at: Timestamp,
}

impl ConversationDto {
    pub fn for_user(conversation: &Conversation, user: UserId) -> Self {
        Self {
            id: conversation.id,
            participants: conversation.participants.clone(),
            order_id: conversation.order_id,
            gig_id: conversation.gig_id,
            kind: conversation.kind,
            subject: conversation.subject.clone(),
            status: conversation.status,
            last_message: conversation.last_message.clone(),
            unread_count: conversation.unread_count_for(user),
            total_messages: conversation.metadata.total_messages,
            last_activity: conversation.metadata.last_activity,
            created_at: conversation.created_at,
        }
    }
}

/// 消息视图。软删除的消息以占位正文出现，不从时间线移除。
#[derive(Debug, Clone, Serialize)]
pub struct MessageDto {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Option<UserId>,
    pub kind: MessageKind,
    pub content: String,
    pub payload: MessagePayload,
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
    pub read_by: Vec<ReadReceipt>,
    pub reactions: Vec<Reaction>,
    pub reply_to: Option<MessageId>,
    pub edited: EditState,
    pub is_deleted: bool,
    pub created_at: Timestamp,
}

impl From<&Message> for MessageDto {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: message.sender,
            kind: message.kind(),
            content: message.content.as_str().to_owned(),
            payload: message.payload.clone(),
            attachments: message.attachments.clone(),
            status: message.status,
            read_by: message.read_by.clone(),
            reactions: message.reactions.clone(),
            reply_to: message.reply_to,
            edited: message.edited.clone(),
            is_deleted: message.flags.is_deleted,
            created_at: message.created_at,
        }
    }
}

/// 按游标翻页的消息页
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageDto>,
    /// 向前翻页的游标：页内最早一条消息
    pub next_before: Option<MessageId>,
    pub total: u64,
}
