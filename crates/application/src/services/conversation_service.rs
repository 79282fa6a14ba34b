//! 会话服务
//!
//! 会话的惰性创建（幂等的 create-or-get）、成员管理与归档。

use std::sync::Arc;

use domain::{
    Conversation, ConversationContext, ConversationFilter, ConversationId,
    ConversationRepository, DomainError, Pagination, RepositoryError, UserId,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::dto::{ConversationDto, Paginated};
use crate::error::{ApplicationError, ApplicationResult};

/// create-or-get 请求：首次联系时由一对参与者惰性创建。
#[derive(Debug, Clone)]
pub struct CreateOrGetRequest {
    pub initiator: UserId,
    pub peer: UserId,
    pub context: ConversationContext,
}

/// 会话列表查询
#[derive(Debug, Clone, Copy, Default)]
pub struct ListConversationsQuery {
    pub filter: ConversationFilter,
    pub pagination: Pagination,
}

pub struct ConversationServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
    // 串行化 create-or-get，保证并发的相同请求拿到同一个会话
    create_lock: Mutex<()>,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self {
            conversations: deps.conversation_repository,
            clock: deps.clock,
            create_lock: Mutex::new(()),
        }
    }

    /// 返回参与者对（与订单上下文）匹配的活跃会话，不存在则创建。
    /// 并发的相同调用是幂等的。
    pub async fn create_or_get(
        &self,
        request: CreateOrGetRequest,
    ) -> ApplicationResult<Conversation> {
        if request.initiator == request.peer {
            return Err(DomainError::validation("participants", "不能与自己创建会话").into());
        }

        let _guard = self.create_lock.lock().await;

        if let Some(existing) = self
            .conversations
            .find_between(request.initiator, request.peer, request.context.order_id)
            .await?
        {
            return Ok(existing);
        }

        let conversation = Conversation::new(
            vec![request.initiator, request.peer],
            request.context,
            self.clock.now(),
        )?;

        match self.conversations.create(conversation.clone()).await {
            Ok(created) => {
                info!(conversation_id = %created.id, "conversation created");
                Ok(created)
            }
            // 与并发创建撞车时回读既有会话
            Err(RepositoryError::Conflict) => self
                .conversations
                .find_between(request.initiator, request.peer, conversation.order_id)
                .await?
                .ok_or_else(|| ApplicationError::Repository(RepositoryError::Conflict)),
            Err(err) => Err(err.into()),
        }
    }

    /// 按最近活动降序列出用户的会话，未读数按请求方展开。
    pub async fn list_for_user(
        &self,
        user: UserId,
        query: ListConversationsQuery,
    ) -> ApplicationResult<Paginated<ConversationDto>> {
        let conversations = self
            .conversations
            .list_for_user(user, query.filter, query.pagination)
            .await?;
        let total = self.conversations.count_for_user(user, query.filter).await?;

        Ok(Paginated {
            items: conversations
                .iter()
                .map(|c| ConversationDto::for_user(c, user))
                .collect(),
            page: query.pagination.page,
            per_page: query.pagination.per_page,
            total,
        })
    }

    /// 加载会话；调用者不是参与者时按不存在处理。
    pub async fn get_for_participant(
        &self,
        id: ConversationId,
        caller: UserId,
    ) -> ApplicationResult<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .filter(|c| c.is_participant(caller))
            .ok_or_else(|| DomainError::not_found("conversation", id))?;
        Ok(conversation)
    }

    pub async fn add_participant(
        &self,
        id: ConversationId,
        caller: UserId,
        user: UserId,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self.get_for_participant(id, caller).await?;
        conversation.add_participant(user, self.clock.now());
        Ok(self.conversations.update(conversation).await?)
    }

    pub async fn remove_participant(
        &self,
        id: ConversationId,
        caller: UserId,
        user: UserId,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self.get_for_participant(id, caller).await?;
        conversation.remove_participant(user, self.clock.now())?;
        Ok(self.conversations.update(conversation).await?)
    }

    pub async fn archive(
        &self,
        id: ConversationId,
        caller: UserId,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self.get_for_participant(id, caller).await?;
        conversation.archive(self.clock.now());
        Ok(self.conversations.update(conversation).await?)
    }

    pub async fn unarchive(
        &self,
        id: ConversationId,
        caller: UserId,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self.get_for_participant(id, caller).await?;
        conversation.unarchive(self.clock.now());
        Ok(self.conversations.update(conversation).await?)
    }
}
