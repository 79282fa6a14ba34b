//! 消息服务
//!
//! 消息的校验与持久化，以及每消息可变侧面（状态、已读、反应、
//! 编辑、软删除、举报）的唯一修改入口。被接受的消息随后更新父会话
//! 的快照与未读计数，并触发实时扇出与定向通知。

use std::sync::Arc;

use domain::{
    Attachment, AttachmentKind, Conversation, ConversationId, ConversationRepository, Currency,
    DomainError, EmailData, FlagReason, Message, MessageContent, MessageId, MessagePayload,
    MessageRepository, PaymentData, ReactionEmoji, Room, ServerEvent, SystemEventKind, UserId,
    VoiceData,
};
use tracing::{info, warn};

use crate::attachments::{AttachmentPipeline, IncomingUpload, UploadKind};
use crate::clock::Clock;
use crate::dto::{MessageDto, MessagePage};
use crate::error::{ApplicationError, ApplicationResult};
use crate::notifications::NotificationFanout;
use crate::fanout::EventFanout;
use crate::rate_limiter::SendRateLimiter;
use crate::sequencer::ConversationSequencer;

/// 每页消息数默认值
const DEFAULT_PAGE_SIZE: u32 = 50;

/// 发送文本（或邮件式）消息
#[derive(Debug, Clone)]
pub struct SendTextCommand {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub reply_to: Option<MessageId>,
    /// Some 时作为邮件式消息发送
    pub email: Option<EmailData>,
}

/// 发送文件/图片/视频消息
#[derive(Debug, Clone)]
pub struct SendFileCommand {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    /// 缺省时使用 "Shared {kind}" 摘要
    pub content: Option<String>,
    pub upload: IncomingUpload,
}

/// 发送语音消息
#[derive(Debug, Clone)]
pub struct SendVoiceCommand {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub upload: IncomingUpload,
}

/// 发送支付请求消息
#[derive(Debug, Clone)]
pub struct SendPaymentRequestCommand {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub amount: f64,
    pub currency: String,
    pub description: String,
}

pub struct MessageServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub pipeline: Arc<AttachmentPipeline>,
    pub fanout: Arc<dyn EventFanout>,
    pub notifications: Arc<NotificationFanout>,
    pub rate_limiter: Arc<SendRateLimiter>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    pipeline: Arc<AttachmentPipeline>,
    fanout: Arc<dyn EventFanout>,
    notifications: Arc<NotificationFanout>,
    rate_limiter: Arc<SendRateLimiter>,
    clock: Arc<dyn Clock>,
    sequencer: ConversationSequencer,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self {
            conversations: deps.conversation_repository,
            messages: deps.message_repository,
            pipeline: deps.pipeline,
            fanout: deps.fanout,
            notifications: deps.notifications,
            rate_limiter: deps.rate_limiter,
            clock: deps.clock,
            sequencer: ConversationSequencer::new(),
        }
    }

    pub async fn send_text(&self, command: SendTextCommand) -> ApplicationResult<MessageDto> {
        let _guard = self.sequencer.acquire(command.conversation_id).await;
        let conversation = self
            .sender_conversation(command.conversation_id, command.sender)
            .await?;
        self.rate_limiter.check(command.sender).await?;

        let content = MessageContent::new(command.content)?;
        let payload = match command.email {
            Some(email) => MessagePayload::Email(email),
            None => MessagePayload::Text,
        };
        if let Some(reply_to) = command.reply_to {
            self.ensure_reply_target(command.conversation_id, reply_to)
                .await?;
        }

        let message = Message::new(
            command.conversation_id,
            Some(command.sender),
            content,
            payload,
            Vec::new(),
            command.reply_to,
            self.clock.now(),
        )?;

        self.accept(conversation, message).await
    }

    pub async fn send_file(&self, command: SendFileCommand) -> ApplicationResult<MessageDto> {
        let _guard = self.sequencer.acquire(command.conversation_id).await;
        let conversation = self
            .sender_conversation(command.conversation_id, command.sender)
            .await?;
        self.rate_limiter.check(command.sender).await?;

        // 附件处理相对消息可见性是同步阻塞的：
        // 上传完成之前消息不会对他人可见
        let attachment = self.pipeline.ingest(command.upload).await?;

        let payload = match attachment.kind {
            AttachmentKind::Image => MessagePayload::Image,
            AttachmentKind::Video => MessagePayload::Video,
            _ => MessagePayload::File,
        };
        let content = MessageContent::new(
            command
                .content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| format!("Shared {}", attachment.kind.as_str())),
        )?;

        let message = Message::new(
            command.conversation_id,
            Some(command.sender),
            content,
            payload,
            vec![attachment],
            None,
            self.clock.now(),
        )?;

        self.accept(conversation, message).await
    }

    pub async fn send_voice(&self, command: SendVoiceCommand) -> ApplicationResult<MessageDto> {
        let _guard = self.sequencer.acquire(command.conversation_id).await;
        let conversation = self
            .sender_conversation(command.conversation_id, command.sender)
            .await?;
        self.rate_limiter.check(command.sender).await?;

        let mut upload = command.upload;
        upload.kind_hint = Some(AttachmentKind::Voice);
        upload.upload_kind = UploadKind::MessageAttachment;
        let attachment = self.pipeline.ingest(upload).await?;

        let voice_data = VoiceData {
            duration: attachment.duration.unwrap_or(0.0),
            waveform: attachment.waveform.clone().unwrap_or_default(),
            transcription: None,
        };

        let message = Message::new(
            command.conversation_id,
            Some(command.sender),
            MessageContent::from_trusted("Voice message"),
            MessagePayload::Voice(voice_data),
            vec![attachment],
            None,
            self.clock.now(),
        )?;

        self.accept(conversation, message).await
    }

    pub async fn send_payment_request(
        &self,
        command: SendPaymentRequestCommand,
    ) -> ApplicationResult<MessageDto> {
        let _guard = self.sequencer.acquire(command.conversation_id).await;
        let conversation = self
            .sender_conversation(command.conversation_id, command.sender)
            .await?;
        self.rate_limiter.check(command.sender).await?;

        let currency = Currency::parse(&command.currency)?;
        let payment = PaymentData::request(command.amount, currency, command.description)?;
        let content = MessageContent::from_trusted(format!(
            "Payment request for ${:.2} {}",
            payment.amount,
            currency.as_str().to_uppercase()
        ));

        let message = Message::new(
            command.conversation_id,
            Some(command.sender),
            content,
            MessagePayload::PaymentRequest(payment),
            Vec::new(),
            None,
            self.clock.now(),
        )?;

        self.accept(conversation, message).await
    }

    /// 系统消息：订单生命周期等外部事件的会话内表示。
    pub async fn send_system(
        &self,
        conversation_id: ConversationId,
        event: SystemEventKind,
        data: Option<serde_json::Value>,
    ) -> ApplicationResult<MessageDto> {
        let _guard = self.sequencer.acquire(conversation_id).await;
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| DomainError::not_found("conversation", conversation_id))?;

        let message = Message::new_system(conversation_id, event, data, self.clock.now())?;
        self.accept(conversation, message).await
    }

    /// 仅原发送者可编辑；首次编辑保留原始内容。
    pub async fn edit(
        &self,
        message_id: MessageId,
        by: UserId,
        new_content: String,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        if message.sender != Some(by) {
            return Err(DomainError::authorization("只能编辑自己的消息").into());
        }

        message.edit(MessageContent::new(new_content)?, self.clock.now())?;
        let updated = self.messages.update(message).await?;

        self.publish(
            &Room::conversation(updated.conversation_id),
            &ServerEvent::MessageEdited {
                conversation_id: updated.conversation_id,
                message: updated.clone(),
            },
        )
        .await;

        Ok(MessageDto::from(&updated))
    }

    /// 软删除：内容替换为占位，记录与时间线位置保留，
    /// `total_messages` 不回退。
    pub async fn soft_delete(
        &self,
        message_id: MessageId,
        by: UserId,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        if message.sender != Some(by) {
            return Err(DomainError::authorization("只能删除自己的消息").into());
        }

        message.soft_delete(by, self.clock.now())?;
        let updated = self.messages.update(message).await?;

        self.publish(
            &Room::conversation(updated.conversation_id),
            &ServerEvent::MessageDeleted {
                conversation_id: updated.conversation_id,
                message_id: updated.id,
            },
        )
        .await;

        Ok(MessageDto::from(&updated))
    }

    /// 幂等的单条已读回执。
    pub async fn mark_read(
        &self,
        message_id: MessageId,
        user: UserId,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        self.participant_conversation(message.conversation_id, user)
            .await?;

        if message.mark_read(user, self.clock.now()) {
            message = self.messages.update(message).await?;
            self.publish(
                &Room::conversation(message.conversation_id),
                &ServerEvent::MessageRead {
                    conversation_id: message.conversation_id,
                    message_id: message.id,
                    user_id: user,
                },
            )
            .await;
        }

        Ok(MessageDto::from(&message))
    }

    /// 把整个会话标记为已读：清零未读计数，并为所有他人发送的
    /// 未读消息补已读回执。
    pub async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        user: UserId,
    ) -> ApplicationResult<()> {
        let mut conversation = self.participant_conversation(conversation_id, user).await?;
        let now = self.clock.now();

        let unread = self
            .messages
            .list_unread_for_user(conversation_id, user)
            .await?;
        for mut message in unread {
            if message.mark_read(user, now) {
                self.messages.update(message).await?;
            }
        }

        conversation.mark_as_read(user, now)?;
        self.conversations.update(conversation).await?;
        info!(conversation_id = %conversation_id, user_id = %user, "conversation marked read");
        Ok(())
    }

    /// 每 (消息, 用户) 恰好一个反应：重复反应替换，不累积。
    pub async fn add_reaction(
        &self,
        message_id: MessageId,
        user: UserId,
        emoji: ReactionEmoji,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        self.participant_conversation(message.conversation_id, user)
            .await?;

        message.add_reaction(user, emoji, self.clock.now());
        let updated = self.messages.update(message).await?;

        self.publish(
            &Room::conversation(updated.conversation_id),
            &ServerEvent::ReactionUpdated {
                conversation_id: updated.conversation_id,
                message: updated.clone(),
            },
        )
        .await;

        Ok(MessageDto::from(&updated))
    }

    pub async fn remove_reaction(
        &self,
        message_id: MessageId,
        user: UserId,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        self.participant_conversation(message.conversation_id, user)
            .await?;

        if message.remove_reaction(user, self.clock.now()) {
            message = self.messages.update(message).await?;
            self.publish(
                &Room::conversation(message.conversation_id),
                &ServerEvent::ReactionUpdated {
                    conversation_id: message.conversation_id,
                    message: message.clone(),
                },
            )
            .await;
        }

        Ok(MessageDto::from(&message))
    }

    /// 举报。达到阈值后自动进入待审核。
    pub async fn flag(
        &self,
        message_id: MessageId,
        user: UserId,
        reason: FlagReason,
    ) -> ApplicationResult<MessageDto> {
        let mut message = self.load(message_id).await?;
        self.participant_conversation(message.conversation_id, user)
            .await?;

        message.flag(user, reason, self.clock.now());
        let updated = self.messages.update(message).await?;
        Ok(MessageDto::from(&updated))
    }

    /// 按时间正序返回会话消息。软删除的条目以占位正文出现在原位置。
    /// 非参与者按会话不存在处理。
    pub async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        caller: UserId,
        before: Option<MessageId>,
        limit: Option<u32>,
    ) -> ApplicationResult<MessagePage> {
        self.participant_conversation(conversation_id, caller)
            .await?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).min(200);
        let messages = self
            .messages
            .list_by_conversation(conversation_id, before, limit)
            .await?;
        let total = self.messages.count_by_conversation(conversation_id).await?;

        Ok(MessagePage {
            next_before: messages.first().map(|m| m.id),
            messages: messages.iter().map(MessageDto::from).collect(),
            total,
        })
    }

    pub async fn get(
        &self,
        message_id: MessageId,
        caller: UserId,
    ) -> ApplicationResult<MessageDto> {
        let message = self.load(message_id).await?;
        self.participant_conversation(message.conversation_id, caller)
            .await?;
        Ok(MessageDto::from(&message))
    }

    // --- 内部 ---

    async fn load(&self, message_id: MessageId) -> ApplicationResult<Message> {
        self.messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id).into())
    }

    /// 发送方授权：非参与者 → AuthorizationError。
    async fn sender_conversation(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
    ) -> ApplicationResult<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| DomainError::not_found("conversation", conversation_id))?;
        if !conversation.is_participant(sender) {
            return Err(DomainError::authorization("不是会话参与者").into());
        }
        Ok(conversation)
    }

    /// 读路径授权：非参与者按会话不存在处理。
    async fn participant_conversation(
        &self,
        conversation_id: ConversationId,
        caller: UserId,
    ) -> ApplicationResult<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .filter(|c| c.is_participant(caller))
            .ok_or_else(|| DomainError::not_found("conversation", conversation_id))?;
        Ok(conversation)
    }

    async fn ensure_reply_target(
        &self,
        conversation_id: ConversationId,
        reply_to: MessageId,
    ) -> ApplicationResult<()> {
        let target = self.load(reply_to).await.map_err(|_| {
            ApplicationError::from(DomainError::validation("reply_to", "被回复的消息不存在"))
        })?;
        if target.conversation_id != conversation_id {
            return Err(DomainError::validation("reply_to", "只能回复同一会话内的消息").into());
        }
        Ok(())
    }

    /// 接受一条已构造好的消息：持久化，然后作为显式的第二步更新
    /// 父会话（快照 + 未读计数）。两步对调用者而言是原子的：
    /// 第二步失败会移除刚写入的消息，保证不留下部分状态。
    async fn accept(
        &self,
        mut conversation: Conversation,
        message: Message,
    ) -> ApplicationResult<MessageDto> {
        let now = self.clock.now();
        let persisted = self.messages.create(message).await?;

        conversation.update_last_message(&persisted, now);
        conversation.increment_unread_count(persisted.sender);

        if let Err(err) = self.conversations.update(conversation.clone()).await {
            warn!(
                message_id = %persisted.id,
                error = %err,
                "conversation denormalize failed, rolling back message"
            );
            if let Err(cleanup) = self.messages.remove(persisted.id).await {
                warn!(message_id = %persisted.id, error = %cleanup, "rollback failed");
            }
            return Err(err.into());
        }

        info!(
            message_id = %persisted.id,
            conversation_id = %persisted.conversation_id,
            kind = persisted.kind().as_str(),
            "message accepted"
        );

        // 房间扇出在会话锁内进行，保证单会话事件与持久化同序
        self.publish(
            &Room::conversation(persisted.conversation_id),
            &ServerEvent::NewMessage {
                conversation_id: persisted.conversation_id,
                message: persisted.clone(),
            },
        )
        .await;

        self.notifications
            .notify_new_message(&conversation, &persisted)
            .await;

        Ok(MessageDto::from(&persisted))
    }

    /// 实时投递是尽力而为的：失败记日志，不影响已接受的写入。
    async fn publish(&self, room: &Room, event: &ServerEvent) {
        if let Err(err) = self.fanout.publish_to_room(room, event).await {
            warn!(error = %err, "realtime fanout failed");
        }
    }
}
