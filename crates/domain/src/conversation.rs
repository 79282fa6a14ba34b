//! 会话实体定义
//!
//! 会话是固定参与者集合之间有序交流的容器，持有
//! 每参与者的已读/未读状态和反范式化的最后一条消息快照。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::message::{Message, MessageKind};
use crate::value_objects::{ConversationId, GigId, OrderId, Timestamp, UserId};

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Order,
    Inquiry,
    Support,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Inquiry => "inquiry",
            Self::Support => "support",
        }
    }
}

/// 会话状态。会话只会被归档或拉黑，永不删除。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
    Blocked,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
            Self::Blocked => "blocked",
        }
    }
}

/// 反范式化的最后一条消息快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub sender: Option<UserId>,
    pub sent_at: Timestamp,
    pub kind: MessageKind,
}

/// 每参与者的已读状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadStatus {
    pub user: UserId,
    pub last_read_at: Timestamp,
    pub unread_count: u32,
}

/// 会话设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub notifications: bool,
    pub auto_archive: bool,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            notifications: true,
            auto_archive: false,
        }
    }
}

/// 会话元数据。`total_messages` 单调不减，软删除也不回退。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub total_messages: u64,
    pub last_activity: Timestamp,
    pub created_by: UserId,
}

/// 会话实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    /// 参与者集合（≥2），成员变化只经由显式的加入/移除
    pub participants: Vec<UserId>,
    pub order_id: Option<OrderId>,
    pub gig_id: Option<GigId>,
    pub kind: ConversationKind,
    pub subject: Option<String>,
    pub last_message: Option<LastMessage>,
    pub status: ConversationStatus,
    /// 不变量：当前每个参与者恰好对应一条记录
    pub read_status: Vec<ReadStatus>,
    pub settings: ConversationSettings,
    pub metadata: ConversationMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 创建会话的上下文参数
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub order_id: Option<OrderId>,
    pub gig_id: Option<GigId>,
    pub kind: Option<ConversationKind>,
    pub subject: Option<String>,
}

impl Conversation {
    pub fn new(
        participants: Vec<UserId>,
        context: ConversationContext,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let unique: std::collections::HashSet<UserId> = participants.iter().copied().collect();
        if unique.len() != participants.len() {
            return Err(DomainError::validation(
                "participants",
                "参与者不能重复",
            ));
        }
        if participants.len() < 2 {
            return Err(DomainError::validation(
                "participants",
                "会话至少需要两个参与者",
            ));
        }
        if let Some(subject) = &context.subject {
            if subject.chars().count() > 100 {
                return Err(DomainError::validation(
                    "subject",
                    "主题不能超过100个字符",
                ));
            }
        }

        let read_status = participants
            .iter()
            .map(|user| ReadStatus {
                user: *user,
                last_read_at: now,
                unread_count: 0,
            })
            .collect();
        let created_by = participants[0];

        Ok(Self {
            id: ConversationId::generate(),
            participants,
            order_id: context.order_id,
            gig_id: context.gig_id,
            kind: context.kind.unwrap_or(ConversationKind::Inquiry),
            subject: context.subject,
            last_message: None,
            status: ConversationStatus::Active,
            read_status,
            settings: ConversationSettings::default(),
            metadata: ConversationMetadata {
                total_messages: 0,
                last_activity: now,
                created_by,
            },
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// 除给定用户外的其余参与者
    pub fn other_participants(&self, user: UserId) -> Vec<UserId> {
        self.participants
            .iter()
            .copied()
            .filter(|p| *p != user)
            .collect()
    }

    /// 加入参与者，并同步补齐对应的已读状态记录。幂等。
    pub fn add_participant(&mut self, user: UserId, now: Timestamp) -> bool {
        if self.is_participant(user) {
            return false;
        }
        self.participants.push(user);
        self.read_status.push(ReadStatus {
            user,
            last_read_at: now,
            unread_count: 0,
        });
        self.updated_at = now;
        true
    }

    /// 移除参与者及其已读状态记录。剩余参与者不能少于两个。
    pub fn remove_participant(&mut self, user: UserId, now: Timestamp) -> DomainResult<()> {
        if !self.is_participant(user) {
            return Err(DomainError::not_found("participant", user));
        }
        if self.participants.len() <= 2 {
            return Err(DomainError::operation_not_allowed(
                "会话至少需要保留两个参与者",
            ));
        }
        self.participants.retain(|p| *p != user);
        self.read_status.retain(|rs| rs.user != user);
        self.updated_at = now;
        Ok(())
    }

    /// 记录一条被接受的消息：更新快照并推进计数。
    /// `total_messages` 只增不减，软删除之后也不回退。
    pub fn update_last_message(&mut self, message: &Message, now: Timestamp) {
        self.last_message = Some(LastMessage {
            content: message.content.as_str().to_owned(),
            sender: message.sender,
            sent_at: message.created_at,
            kind: message.kind(),
        });
        self.metadata.total_messages += 1;
        self.metadata.last_activity = now;
        self.updated_at = now;
    }

    /// 为发送者之外的所有参与者递增未读数。
    pub fn increment_unread_count(&mut self, sender: Option<UserId>) {
        for rs in &mut self.read_status {
            if Some(rs.user) != sender {
                rs.unread_count += 1;
            }
        }
    }

    /// 该参与者的未读数清零并刷新最近已读时间。
    pub fn mark_as_read(&mut self, user: UserId, now: Timestamp) -> DomainResult<()> {
        let rs = self
            .read_status
            .iter_mut()
            .find(|rs| rs.user == user)
            .ok_or_else(|| DomainError::authorization("不是会话参与者"))?;
        rs.last_read_at = now;
        rs.unread_count = 0;
        self.updated_at = now;
        Ok(())
    }

    pub fn unread_count_for(&self, user: UserId) -> u32 {
        self.read_status
            .iter()
            .find(|rs| rs.user == user)
            .map(|rs| rs.unread_count)
            .unwrap_or(0)
    }

    /// 仅切换状态，不丢任何数据。
    pub fn archive(&mut self, now: Timestamp) {
        self.status = ConversationStatus::Archived;
        self.updated_at = now;
    }

    pub fn unarchive(&mut self, now: Timestamp) {
        self.status = ConversationStatus::Active;
        self.updated_at = now;
    }

    pub fn block(&mut self, now: Timestamp) {
        self.status = ConversationStatus::Blocked;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessagePayload;
    use crate::value_objects::MessageContent;

    fn pair() -> (UserId, UserId) {
        (UserId::generate(), UserId::generate())
    }

    fn conversation(a: UserId, b: UserId) -> Conversation {
        Conversation::new(
            vec![a, b],
            ConversationContext::default(),
            chrono::Utc::now(),
        )
        .unwrap()
    }

    fn text_message(conversation_id: ConversationId, sender: UserId) -> Message {
        Message::new(
            conversation_id,
            Some(sender),
            MessageContent::new("Hello").unwrap(),
            MessagePayload::Text,
            Vec::new(),
            None,
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn new_conversation_initializes_read_status_per_participant() {
        let (a, b) = pair();
        let conv = conversation(a, b);
        assert_eq!(conv.read_status.len(), 2);
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.kind, ConversationKind::Inquiry);
        assert_eq!(conv.metadata.total_messages, 0);
    }

    #[test]
    fn rejects_fewer_than_two_or_duplicate_participants() {
        let a = UserId::generate();
        let now = chrono::Utc::now();
        assert!(Conversation::new(vec![a], ConversationContext::default(), now).is_err());
        assert!(Conversation::new(vec![a, a], ConversationContext::default(), now).is_err());
    }

    #[test]
    fn membership_changes_keep_read_status_in_sync() {
        let (a, b) = pair();
        let mut conv = conversation(a, b);
        let c = UserId::generate();
        let now = chrono::Utc::now();

        assert!(conv.add_participant(c, now));
        assert!(!conv.add_participant(c, now));
        assert_eq!(conv.participants.len(), 3);
        assert_eq!(conv.read_status.len(), 3);

        conv.remove_participant(c, now).unwrap();
        assert_eq!(conv.participants.len(), 2);
        assert_eq!(conv.read_status.len(), 2);

        // 不能减到两人以下
        assert!(conv.remove_participant(b, now).is_err());
    }

    #[test]
    fn update_last_message_increments_total_and_sets_snapshot() {
        let (a, b) = pair();
        let mut conv = conversation(a, b);
        let message = text_message(conv.id, a);
        let now = chrono::Utc::now();

        conv.update_last_message(&message, now);
        assert_eq!(conv.metadata.total_messages, 1);
        let snapshot = conv.last_message.as_ref().unwrap();
        assert_eq!(snapshot.content, "Hello");
        assert_eq!(snapshot.sender, Some(a));
        assert_eq!(snapshot.kind, MessageKind::Text);
    }

    #[test]
    fn unread_counters_skip_the_sender() {
        let (a, b) = pair();
        let mut conv = conversation(a, b);

        conv.increment_unread_count(Some(a));
        conv.increment_unread_count(Some(a));
        assert_eq!(conv.unread_count_for(a), 0);
        assert_eq!(conv.unread_count_for(b), 2);

        conv.mark_as_read(b, chrono::Utc::now()).unwrap();
        assert_eq!(conv.unread_count_for(b), 0);
    }

    #[test]
    fn system_message_increments_unread_for_everyone() {
        let (a, b) = pair();
        let mut conv = conversation(a, b);
        conv.increment_unread_count(None);
        assert_eq!(conv.unread_count_for(a), 1);
        assert_eq!(conv.unread_count_for(b), 1);
    }

    #[test]
    fn archive_toggles_status_without_data_loss() {
        let (a, b) = pair();
        let mut conv = conversation(a, b);
        let message = text_message(conv.id, a);
        let now = chrono::Utc::now();
        conv.update_last_message(&message, now);

        conv.archive(now);
        assert_eq!(conv.status, ConversationStatus::Archived);
        assert_eq!(conv.metadata.total_messages, 1);

        conv.unarchive(now);
        assert_eq!(conv.status, ConversationStatus::Active);
        assert!(conv.last_message.is_some());
    }
}
