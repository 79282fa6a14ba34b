//! 消息实体定义
//!
//! 消息是会话内的单个通信单元。类型特定负载建模为标签联合，
//! 消息存储与网关对其做穷尽匹配。

use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// 软删除后替换正文的固定占位内容。
pub const DELETED_PLACEHOLDER: &str = "This message has been deleted";

/// 自动标记审核的举报数阈值。
pub const FLAG_THRESHOLD: usize = 5;

/// 支付金额下限（美元）。
pub const MIN_PAYMENT_AMOUNT: f64 = 0.50;

/// 消息投递状态，只允许单调升级 sent → delivered → read。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

/// 支付消息状态。结算是外部系统的职责，
/// 消息层不提供任何转移到 succeeded 的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

/// 支持的结算货币
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            other => Err(DomainError::validation(
                "currency",
                format!("不支持的货币: {}", other),
            )),
        }
    }
}

/// 支付请求/回执负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentData {
    pub amount: f64,
    pub currency: Currency,
    pub description: String,
    pub status: PaymentStatus,
}

impl PaymentData {
    pub fn request(amount: f64, currency: Currency, description: impl Into<String>) -> DomainResult<Self> {
        let description = description.into().trim().to_owned();
        if amount < MIN_PAYMENT_AMOUNT {
            return Err(DomainError::validation(
                "amount",
                format!("金额不能低于 {:.2}", MIN_PAYMENT_AMOUNT),
            ));
        }
        if description.is_empty() {
            return Err(DomainError::validation("description", "支付说明不能为空"));
        }
        if description.chars().count() > 200 {
            return Err(DomainError::validation(
                "description",
                "支付说明不能超过200个字符",
            ));
        }
        Ok(Self {
            amount,
            currency,
            description,
            status: PaymentStatus::Pending,
        })
    }
}

/// 语音消息负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceData {
    /// 时长（秒）
    pub duration: f64,
    /// 客户端生成的波形采样
    pub waveform: Vec<f32>,
    pub transcription: Option<String>,
}

/// 系统消息事件类别（订单生命周期通知等）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    OrderCreated,
    OrderStarted,
    OrderDelivered,
    OrderCompleted,
    OrderCancelled,
    RevisionRequested,
    DeadlineExtended,
    UserJoined,
    UserLeft,
}

impl SystemEventKind {
    /// 系统消息的规范正文
    pub fn default_content(&self) -> &'static str {
        match self {
            Self::OrderCreated => "Order has been created",
            Self::OrderStarted => "Order has been started",
            Self::OrderDelivered => "Order has been delivered",
            Self::OrderCompleted => "Order has been completed",
            Self::OrderCancelled => "Order has been cancelled",
            Self::RevisionRequested => "Revision has been requested",
            Self::DeadlineExtended => "Deadline has been extended",
            Self::UserJoined => "User joined the conversation",
            Self::UserLeft => "User left the conversation",
        }
    }
}

/// 系统消息负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemData {
    pub event: SystemEventKind,
    pub data: Option<serde_json::Value>,
}

/// 邮件式消息负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub subject: Option<String>,
    #[serde(default)]
    pub priority: EmailPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// 消息类型负载（标签联合）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text,
    File,
    Image,
    Video,
    Email(EmailData),
    Voice(VoiceData),
    PaymentRequest(PaymentData),
    PaymentReceipt(PaymentData),
    System(SystemData),
}

impl MessagePayload {
    /// 扁平的类型判别值，用于快照与持久化列。
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text => MessageKind::Text,
            Self::File => MessageKind::File,
            Self::Image => MessageKind::Image,
            Self::Video => MessageKind::Video,
            Self::Email(_) => MessageKind::Email,
            Self::Voice(_) => MessageKind::Voice,
            Self::PaymentRequest(_) => MessageKind::PaymentRequest,
            Self::PaymentReceipt(_) => MessageKind::PaymentReceipt,
            Self::System(_) => MessageKind::System,
        }
    }
}

/// 消息类型判别值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    File,
    Image,
    Video,
    Email,
    Voice,
    PaymentRequest,
    PaymentReceipt,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::Image => "image",
            Self::Video => "video",
            Self::Email => "email",
            Self::Voice => "voice",
            Self::PaymentRequest => "payment_request",
            Self::PaymentReceipt => "payment_receipt",
            Self::System => "system",
        }
    }
}

/// 已读回执
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user: UserId,
    pub read_at: Timestamp,
}

/// 固定的反应表情集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionEmoji {
    ThumbsUp,
    ThumbsDown,
    Heart,
    Laugh,
    Surprised,
    Sad,
    Angry,
}

/// 消息反应，每个用户至多一条
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user: UserId,
    pub emoji: ReactionEmoji,
    pub reacted_at: Timestamp,
}

/// 一次编辑前的历史版本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRevision {
    pub content: String,
    pub edited_at: Timestamp,
}

/// 编辑状态
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditState {
    pub is_edited: bool,
    pub edited_at: Option<Timestamp>,
    /// 首次编辑时捕获一次，之后不再覆盖
    pub original_content: Option<String>,
    pub history: Vec<EditRevision>,
}

/// 举报原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    Spam,
    Inappropriate,
    Harassment,
    Other,
}

/// 单个用户的举报记录
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagReport {
    pub user: UserId,
    pub reason: FlagReason,
    pub flagged_at: Timestamp,
}

/// 软删除与审核标记
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageFlags {
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<UserId>,
    pub is_flagged: bool,
    pub flagged_at: Option<Timestamp>,
    /// 每个用户至多一条举报
    pub reports: Vec<FlagReport>,
}

impl MessageFlags {
    pub fn flag_count(&self) -> usize {
        self.reports.len()
    }

    pub fn distinct_reasons(&self) -> Vec<FlagReason> {
        let mut reasons: Vec<FlagReason> = Vec::new();
        for report in &self.reports {
            if !reasons.contains(&report.reason) {
                reasons.push(report.reason);
            }
        }
        reasons
    }
}

/// 投递追踪
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub sent_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
}

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// 仅系统消息允许无发送者
    pub sender: Option<UserId>,
    pub content: MessageContent,
    pub payload: MessagePayload,
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
    pub read_by: Vec<ReadReceipt>,
    pub reactions: Vec<Reaction>,
    /// 同会话内另一条消息的引用，非拥有指针
    pub reply_to: Option<MessageId>,
    pub edited: EditState,
    pub flags: MessageFlags,
    pub delivery: DeliveryInfo,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

impl Message {
    /// 创建新消息。负载相关的约束在这里统一校验：
    /// 语音消息必须携带至少一个附件，系统消息是唯一允许无发送者的类型。
    pub fn new(
        conversation_id: ConversationId,
        sender: Option<UserId>,
        content: MessageContent,
        payload: MessagePayload,
        attachments: Vec<Attachment>,
        reply_to: Option<MessageId>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        match &payload {
            MessagePayload::System(_) => {}
            _ => {
                if sender.is_none() {
                    return Err(DomainError::validation("sender", "发送者不能为空"));
                }
            }
        }

        if let MessagePayload::Voice(_) = &payload {
            if attachments.is_empty() {
                return Err(DomainError::validation(
                    "attachments",
                    "语音消息必须携带音频附件",
                ));
            }
        }

        Ok(Self {
            id: MessageId::generate(),
            conversation_id,
            sender,
            content,
            payload,
            attachments,
            status: MessageStatus::Sent,
            read_by: Vec::new(),
            reactions: Vec::new(),
            reply_to,
            edited: EditState::default(),
            flags: MessageFlags::default(),
            delivery: DeliveryInfo {
                sent_at: now,
                delivered_at: None,
                failed_at: None,
            },
            created_at: now,
            updated_at: None,
        })
    }

    /// 创建系统消息
    pub fn new_system(
        conversation_id: ConversationId,
        event: SystemEventKind,
        data: Option<serde_json::Value>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        Self::new(
            conversation_id,
            None,
            MessageContent::from_trusted(event.default_content()),
            MessagePayload::System(SystemData { event, data }),
            Vec::new(),
            None,
            now,
        )
    }

    /// 单调升级投递状态，绝不回退。
    pub fn upgrade_status(&mut self, to: MessageStatus, now: Timestamp) {
        if to == MessageStatus::Failed {
            return;
        }
        if to > self.status {
            self.status = to;
            if self.delivery.delivered_at.is_none() && to >= MessageStatus::Delivered {
                self.delivery.delivered_at = Some(now);
            }
        }
    }

    /// 幂等地记录一次已读。返回是否新增了回执。
    ///
    /// 非发送者的首次已读会把状态升级为 read。
    pub fn mark_read(&mut self, user: UserId, now: Timestamp) -> bool {
        if self.read_by.iter().any(|receipt| receipt.user == user) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user,
            read_at: now,
        });
        if self.sender != Some(user) {
            self.upgrade_status(MessageStatus::Read, now);
        }
        self.updated_at = Some(now);
        true
    }

    pub fn is_read_by(&self, user: UserId) -> bool {
        self.read_by.iter().any(|receipt| receipt.user == user)
    }

    /// 覆盖式添加反应：同一用户重复反应时替换旧值。
    pub fn add_reaction(&mut self, user: UserId, emoji: ReactionEmoji, now: Timestamp) {
        self.reactions.retain(|reaction| reaction.user != user);
        self.reactions.push(Reaction {
            user,
            emoji,
            reacted_at: now,
        });
        self.updated_at = Some(now);
    }

    pub fn remove_reaction(&mut self, user: UserId, now: Timestamp) -> bool {
        let before = self.reactions.len();
        self.reactions.retain(|reaction| reaction.user != user);
        let removed = self.reactions.len() != before;
        if removed {
            self.updated_at = Some(now);
        }
        removed
    }

    /// 编辑正文。首次编辑保留原始内容，此后每次编辑把
    /// 当前内容追加到历史里再覆盖。
    pub fn edit(&mut self, new_content: MessageContent, now: Timestamp) -> DomainResult<()> {
        if self.flags.is_deleted {
            return Err(DomainError::operation_not_allowed("已删除的消息不能编辑"));
        }
        if self.edited.original_content.is_none() {
            self.edited.original_content = Some(self.content.as_str().to_owned());
        }
        self.edited.history.push(EditRevision {
            content: self.content.as_str().to_owned(),
            edited_at: now,
        });
        self.content = new_content;
        self.edited.is_edited = true;
        self.edited.edited_at = Some(now);
        self.updated_at = Some(now);
        Ok(())
    }

    /// 软删除：正文替换为固定占位，记录保留且仍占据时间线位置。
    pub fn soft_delete(&mut self, by: UserId, now: Timestamp) -> DomainResult<()> {
        if self.flags.is_deleted {
            return Err(DomainError::operation_not_allowed("消息已删除"));
        }
        self.flags.is_deleted = true;
        self.flags.deleted_at = Some(now);
        self.flags.deleted_by = Some(by);
        self.content = MessageContent::from_trusted(DELETED_PLACEHOLDER);
        self.updated_at = Some(now);
        Ok(())
    }

    /// 记录举报。同一用户重复举报只更新原因，不重复计数；
    /// 达到阈值后自动标记待审核。
    pub fn flag(&mut self, by: UserId, reason: FlagReason, now: Timestamp) {
        match self
            .flags
            .reports
            .iter_mut()
            .find(|report| report.user == by)
        {
            Some(report) => {
                report.reason = reason;
                report.flagged_at = now;
            }
            None => {
                self.flags.reports.push(FlagReport {
                    user: by,
                    reason,
                    flagged_at: now,
                });
            }
        }
        if self.flags.flag_count() >= FLAG_THRESHOLD && !self.flags.is_flagged {
            self.flags.is_flagged = true;
            self.flags.flagged_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// 用于通知的消息预览
    pub fn preview(&self, max_chars: usize) -> String {
        self.content.preview(max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message() -> Message {
        Message::new(
            ConversationId::generate(),
            Some(UserId::generate()),
            MessageContent::new("Hello").unwrap(),
            MessagePayload::Text,
            Vec::new(),
            None,
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn non_system_message_requires_sender() {
        let result = Message::new(
            ConversationId::generate(),
            None,
            MessageContent::new("Hello").unwrap(),
            MessagePayload::Text,
            Vec::new(),
            None,
            chrono::Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn system_message_has_no_sender_and_canonical_content() {
        let message = Message::new_system(
            ConversationId::generate(),
            SystemEventKind::OrderDelivered,
            None,
            chrono::Utc::now(),
        )
        .unwrap();
        assert!(message.sender.is_none());
        assert_eq!(message.content.as_str(), "Order has been delivered");
        assert_eq!(message.kind(), MessageKind::System);
    }

    #[test]
    fn voice_message_requires_attachment() {
        let result = Message::new(
            ConversationId::generate(),
            Some(UserId::generate()),
            MessageContent::new("Voice message").unwrap(),
            MessagePayload::Voice(VoiceData {
                duration: 2.5,
                waveform: vec![],
                transcription: None,
            }),
            Vec::new(),
            None,
            chrono::Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn payment_request_validates_amount_and_description() {
        assert!(PaymentData::request(0.49, Currency::Usd, "Logo design").is_err());
        assert!(PaymentData::request(25.0, Currency::Usd, "  ").is_err());
        let data = PaymentData::request(25.0, Currency::Usd, "Logo design").unwrap();
        assert_eq!(data.status, PaymentStatus::Pending);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut message = text_message();
        let reader = UserId::generate();
        let now = chrono::Utc::now();

        assert!(message.mark_read(reader, now));
        assert!(!message.mark_read(reader, now));
        assert_eq!(message.read_by.len(), 1);
        assert_eq!(message.status, MessageStatus::Read);
    }

    #[test]
    fn sender_read_does_not_upgrade_status() {
        let mut message = text_message();
        let sender = message.sender.unwrap();
        message.mark_read(sender, chrono::Utc::now());
        assert_eq!(message.status, MessageStatus::Sent);
    }

    #[test]
    fn status_never_downgrades() {
        let mut message = text_message();
        let now = chrono::Utc::now();
        message.upgrade_status(MessageStatus::Read, now);
        message.upgrade_status(MessageStatus::Delivered, now);
        assert_eq!(message.status, MessageStatus::Read);
        message.upgrade_status(MessageStatus::Sent, now);
        assert_eq!(message.status, MessageStatus::Read);
    }

    #[test]
    fn one_reaction_per_user_last_write_wins() {
        let mut message = text_message();
        let user = UserId::generate();
        let now = chrono::Utc::now();

        message.add_reaction(user, ReactionEmoji::ThumbsUp, now);
        message.add_reaction(user, ReactionEmoji::Heart, now);

        assert_eq!(message.reactions.len(), 1);
        assert_eq!(message.reactions[0].emoji, ReactionEmoji::Heart);

        assert!(message.remove_reaction(user, now));
        assert!(message.reactions.is_empty());
        assert!(!message.remove_reaction(user, now));
    }

    #[test]
    fn first_edit_preserves_original_content_once() {
        let mut message = text_message();
        let now = chrono::Utc::now();

        message
            .edit(MessageContent::new("第二版").unwrap(), now)
            .unwrap();
        message
            .edit(MessageContent::new("第三版").unwrap(), now)
            .unwrap();

        assert!(message.edited.is_edited);
        assert_eq!(message.edited.original_content.as_deref(), Some("Hello"));
        assert_eq!(message.edited.history.len(), 2);
        assert_eq!(message.edited.history[0].content, "Hello");
        assert_eq!(message.edited.history[1].content, "第二版");
        assert_eq!(message.content.as_str(), "第三版");
    }

    #[test]
    fn soft_delete_replaces_content_and_blocks_edit() {
        let mut message = text_message();
        let deleter = message.sender.unwrap();
        let now = chrono::Utc::now();

        message.soft_delete(deleter, now).unwrap();
        assert!(message.is_deleted());
        assert_eq!(message.content.as_str(), DELETED_PLACEHOLDER);
        assert!(message
            .edit(MessageContent::new("new").unwrap(), now)
            .is_err());
        assert!(message.soft_delete(deleter, now).is_err());
    }

    #[test]
    fn flag_threshold_auto_flags_at_five_distinct_users() {
        let mut message = text_message();
        let now = chrono::Utc::now();

        let repeat_flagger = UserId::generate();
        message.flag(repeat_flagger, FlagReason::Spam, now);
        message.flag(repeat_flagger, FlagReason::Harassment, now);
        assert_eq!(message.flags.flag_count(), 1);
        assert!(!message.flags.is_flagged);

        for _ in 0..3 {
            message.flag(UserId::generate(), FlagReason::Spam, now);
        }
        assert!(!message.flags.is_flagged);

        message.flag(UserId::generate(), FlagReason::Other, now);
        assert_eq!(message.flags.flag_count(), 5);
        assert!(message.flags.is_flagged);
        assert_eq!(message.flags.distinct_reasons().len(), 3);
    }
}
