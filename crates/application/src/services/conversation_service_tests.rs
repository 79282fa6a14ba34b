//! 会话服务行为测试

use std::sync::Arc;

use domain::{
    ConversationContext, ConversationFilter, ConversationKind, ConversationStatus, OrderId,
    Pagination, UserId,
};

use crate::clock::SystemClock;
use crate::memory::InMemoryConversationRepository;
use crate::services::{
    ConversationService, ConversationServiceDependencies, CreateOrGetRequest,
    ListConversationsQuery,
};

fn service() -> ConversationService {
    ConversationService::new(ConversationServiceDependencies {
        conversation_repository: Arc::new(InMemoryConversationRepository::new()),
        clock: Arc::new(SystemClock),
    })
}

fn request(a: UserId, b: UserId, order_id: Option<OrderId>) -> CreateOrGetRequest {
    CreateOrGetRequest {
        initiator: a,
        peer: b,
        context: ConversationContext {
            order_id,
            kind: order_id.map(|_| ConversationKind::Order),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn create_or_get_is_idempotent_for_same_pair_and_order() {
    let service = service();
    let (a, b) = (UserId::generate(), UserId::generate());
    let order = Some(OrderId::generate());

    let first = service.create_or_get(request(a, b, order)).await.unwrap();
    let second = service.create_or_get(request(a, b, order)).await.unwrap();
    assert_eq!(first.id, second.id);

    // 对调参与者顺序仍命中同一个会话
    let swapped = service.create_or_get(request(b, a, order)).await.unwrap();
    assert_eq!(first.id, swapped.id);
}

#[tokio::test]
async fn concurrent_create_or_get_returns_single_conversation() {
    let service = Arc::new(service());
    let (a, b) = (UserId::generate(), UserId::generate());

    let (first, second) = futures::join!(
        service.create_or_get(request(a, b, None)),
        service.create_or_get(request(a, b, None)),
    );
    assert_eq!(first.unwrap().id, second.unwrap().id);
}

#[tokio::test]
async fn order_context_separates_conversations() {
    let service = service();
    let (a, b) = (UserId::generate(), UserId::generate());

    let inquiry = service.create_or_get(request(a, b, None)).await.unwrap();
    let order_scoped = service
        .create_or_get(request(a, b, Some(OrderId::generate())))
        .await
        .unwrap();
    assert_ne!(inquiry.id, order_scoped.id);
    assert_eq!(inquiry.kind, ConversationKind::Inquiry);
    assert_eq!(order_scoped.kind, ConversationKind::Order);
}

#[tokio::test]
async fn self_conversation_is_rejected() {
    let service = service();
    let a = UserId::generate();
    assert!(service.create_or_get(request(a, a, None)).await.is_err());
}

#[tokio::test]
async fn list_for_user_filters_and_exposes_unread() {
    let service = service();
    let (a, b) = (UserId::generate(), UserId::generate());
    let conversation = service.create_or_get(request(a, b, None)).await.unwrap();

    let page = service
        .list_for_user(a, ListConversationsQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, conversation.id);
    assert_eq!(page.items[0].unread_count, 0);

    // 归档后默认列表不再包含，但按状态过滤可见
    service.archive(conversation.id, a).await.unwrap();
    let page = service
        .list_for_user(a, ListConversationsQuery::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());

    let archived = service
        .list_for_user(
            a,
            ListConversationsQuery {
                filter: ConversationFilter {
                    status: Some(ConversationStatus::Archived),
                    ..Default::default()
                },
                pagination: Pagination::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(archived.items.len(), 1);
    assert_eq!(archived.items[0].status, ConversationStatus::Archived);
}

#[tokio::test]
async fn membership_changes_go_through_explicit_add_remove() {
    let service = service();
    let (a, b) = (UserId::generate(), UserId::generate());
    let conversation = service.create_or_get(request(a, b, None)).await.unwrap();

    let c = UserId::generate();
    let updated = service.add_participant(conversation.id, a, c).await.unwrap();
    assert_eq!(updated.participants.len(), 3);
    assert_eq!(updated.read_status.len(), 3);

    let updated = service
        .remove_participant(conversation.id, a, c)
        .await
        .unwrap();
    assert_eq!(updated.participants.len(), 2);
    assert_eq!(updated.read_status.len(), 2);

    // 非参与者无法操作会话
    let outsider = UserId::generate();
    assert!(service
        .add_participant(conversation.id, outsider, UserId::generate())
        .await
        .is_err());
}
