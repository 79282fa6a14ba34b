//! 仓储接口定义

use async_trait::async_trait;

use crate::conversation::{Conversation, ConversationKind, ConversationStatus};
use crate::errors::RepositoryResult;
use crate::message::Message;
use crate::value_objects::{ConversationId, MessageId, OrderId, UserId};

/// 会话列表过滤条件
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationFilter {
    pub kind: Option<ConversationKind>,
    pub status: Option<ConversationStatus>,
}

/// 页码分页
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }
}

/// 会话仓储接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>>;

    /// 查找两个参与者之间的活跃会话；订单上下文存在时必须精确匹配。
    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<Conversation>>;

    /// 按最近活动降序列出用户参与的会话。
    async fn list_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
        pagination: Pagination,
    ) -> RepositoryResult<Vec<Conversation>>;

    async fn count_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
    ) -> RepositoryResult<u64>;
}

/// 消息仓储接口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> RepositoryResult<Message>;

    async fn update(&self, message: Message) -> RepositoryResult<Message>;

    /// 物理移除。仅用于补偿未完成的发送，常规删除走软删除。
    async fn remove(&self, id: MessageId) -> RepositoryResult<()>;

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 按时间正序返回会话消息；`before` 为向前翻页的游标。
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>>;

    /// 返回会话内指定用户尚未读过的、他人发送的消息。
    async fn list_unread_for_user(
        &self,
        conversation_id: ConversationId,
        user: UserId,
    ) -> RepositoryResult<Vec<Message>>;

    async fn count_by_conversation(&self, conversation_id: ConversationId)
        -> RepositoryResult<u64>;
}
