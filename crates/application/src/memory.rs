//! 内存适配器
//!
//! 用于测试与无外部依赖的简单部署：仓储、对象存储、在线状态。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use domain::{
    Conversation, ConversationFilter, ConversationId, ConversationRepository,
    ConversationStatus, Message, MessageId, MessageRepository, OrderId, Pagination,
    RepositoryError, RepositoryResult, Room, ServerEvent, UserId,
};
use tokio::sync::RwLock;

use crate::fanout::{EventFanout, FanoutError};
use crate::presence::{PresenceError, PresenceStore};
use crate::storage::{BlobStorage, PutBlobRequest, StorageError, StoredBlob};

/// 内存会话仓储
#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(conversation: &Conversation, filter: &ConversationFilter) -> bool {
    if let Some(kind) = filter.kind {
        if conversation.kind != kind {
            return false;
        }
    }
    match filter.status {
        Some(status) => conversation.status == status,
        // 不指定状态时默认只看活跃会话
        None => conversation.status == ConversationStatus::Active,
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::Conflict);
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::NotFound);
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| {
                c.status == ConversationStatus::Active
                    && c.is_participant(a)
                    && c.is_participant(b)
                    && c.order_id == order_id
            })
            .cloned())
    }

    async fn list_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
        pagination: Pagination,
    ) -> RepositoryResult<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut matched: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.is_participant(user) && matches_filter(c, &filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.metadata.last_activity.cmp(&a.metadata.last_activity));

        let start = pagination.offset() as usize;
        let end = (start + pagination.per_page as usize).min(matched.len());
        if start >= matched.len() {
            return Ok(Vec::new());
        }
        Ok(matched[start..end].to_vec())
    }

    async fn count_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
    ) -> RepositoryResult<u64> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .filter(|c| c.is_participant(user) && matches_filter(c, &filter))
            .count() as u64)
    }
}

/// 内存消息仓储，按会话维护时间正序索引
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<MessageId, Message>>,
    by_conversation: RwLock<HashMap<ConversationId, Vec<MessageId>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: Message) -> RepositoryResult<Message> {
        let mut messages = self.messages.write().await;
        if messages.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }
        messages.insert(message.id, message.clone());
        drop(messages);

        let mut index = self.by_conversation.write().await;
        index
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        Ok(message)
    }

    async fn update(&self, message: Message) -> RepositoryResult<Message> {
        let mut messages = self.messages.write().await;
        if !messages.contains_key(&message.id) {
            return Err(RepositoryError::NotFound);
        }
        messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn remove(&self, id: MessageId) -> RepositoryResult<()> {
        let mut messages = self.messages.write().await;
        let message = messages.remove(&id).ok_or(RepositoryError::NotFound)?;
        drop(messages);

        let mut index = self.by_conversation.write().await;
        if let Some(ids) = index.get_mut(&message.conversation_id) {
            ids.retain(|existing| *existing != id);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let index = self.by_conversation.read().await;
        let ids = index.get(&conversation_id).cloned().unwrap_or_default();
        drop(index);

        let messages = self.messages.read().await;
        let ordered: Vec<Message> = ids
            .iter()
            .filter_map(|id| messages.get(id).cloned())
            .collect();

        let upper = match before {
            Some(cursor) => ordered
                .iter()
                .position(|m| m.id == cursor)
                .unwrap_or(ordered.len()),
            None => ordered.len(),
        };
        let lower = upper.saturating_sub(limit as usize);
        Ok(ordered[lower..upper].to_vec())
    }

    async fn list_unread_for_user(
        &self,
        conversation_id: ConversationId,
        user: UserId,
    ) -> RepositoryResult<Vec<Message>> {
        let index = self.by_conversation.read().await;
        let ids = index.get(&conversation_id).cloned().unwrap_or_default();
        drop(index);

        let messages = self.messages.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| messages.get(id))
            .filter(|m| m.sender != Some(user) && !m.is_read_by(user) && !m.is_deleted())
            .cloned()
            .collect())
    }

    async fn count_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<u64> {
        let index = self.by_conversation.read().await;
        Ok(index
            .get(&conversation_id)
            .map(|ids| ids.len() as u64)
            .unwrap_or(0))
    }
}

/// 内存对象存储。记录写入次数，便于测试断言
/// “校验失败的上传不会产生任何存储副作用”。
pub struct InMemoryBlobStorage {
    base_url: String,
    blobs: RwLock<HashMap<String, Bytes>>,
    put_count: AtomicUsize,
}

impl InMemoryBlobStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            blobs: RwLock::new(HashMap::new()),
            put_count: AtomicUsize::new(0),
        }
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    pub async fn contains(&self, storage_id: &str) -> bool {
        self.blobs.read().await.contains_key(storage_id)
    }
}

impl Default for InMemoryBlobStorage {
    fn default() -> Self {
        Self::new("http://storage.local")
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn put(&self, request: PutBlobRequest) -> Result<StoredBlob, StorageError> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        let storage_id = format!("{}/{}", request.path, request.filename);
        let url = format!("{}/{}", self.base_url, storage_id);
        self.blobs
            .write()
            .await
            .insert(storage_id.clone(), request.bytes);
        Ok(StoredBlob {
            url,
            storage_id,
            duration: None,
        })
    }

    async fn delete(&self, storage_id: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(storage_id);
        Ok(())
    }
}

/// 总是失败的对象存储，用于验证“全有或全无”。
#[derive(Default)]
pub struct FailingBlobStorage;

#[async_trait]
impl BlobStorage for FailingBlobStorage {
    async fn put(&self, _request: PutBlobRequest) -> Result<StoredBlob, StorageError> {
        Err(StorageError::Upstream("simulated outage".to_string()))
    }

    async fn delete(&self, _storage_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// 内存在线状态
#[derive(Default)]
pub struct InMemoryPresenceStore {
    online: RwLock<HashMap<UserId, ()>>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn mark_online(&self, user: UserId) -> Result<(), PresenceError> {
        self.online.write().await.insert(user, ());
        Ok(())
    }

    async fn mark_offline(&self, user: UserId) -> Result<(), PresenceError> {
        self.online.write().await.remove(&user);
        Ok(())
    }

    async fn is_online(&self, user: UserId) -> Result<bool, PresenceError> {
        Ok(self.online.read().await.contains_key(&user))
    }

    async fn online_users(&self) -> Result<Vec<UserId>, PresenceError> {
        Ok(self.online.read().await.keys().copied().collect())
    }
}

/// 记录所有已发布事件的扇出实现，供测试断言投递行为。
#[derive(Default)]
pub struct RecordingFanout {
    pub published: RwLock<Vec<(Option<Room>, ServerEvent)>>,
    rooms: RwLock<HashMap<UserId, Vec<Room>>>,
}

impl RecordingFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明某用户已订阅某房间（测试夹具）。
    pub async fn subscribe(&self, user: UserId, room: Room) {
        self.rooms.write().await.entry(user).or_default().push(room);
    }

    pub async fn events(&self) -> Vec<(Option<Room>, ServerEvent)> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl EventFanout for RecordingFanout {
    async fn publish_to_room(
        &self,
        room: &Room,
        event: &ServerEvent,
    ) -> Result<usize, FanoutError> {
        self.published
            .write()
            .await
            .push((Some(*room), event.clone()));
        Ok(1)
    }

    async fn publish_to_user(
        &self,
        user: UserId,
        event: &ServerEvent,
    ) -> Result<usize, FanoutError> {
        self.publish_to_room(&Room::user(user), event).await
    }

    async fn broadcast_all(&self, event: &ServerEvent) -> Result<usize, FanoutError> {
        self.published.write().await.push((None, event.clone()));
        Ok(1)
    }

    async fn is_user_in_room(&self, user: UserId, room: &Room) -> bool {
        self.rooms
            .read()
            .await
            .get(&user)
            .map(|rooms| rooms.contains(room))
            .unwrap_or(false)
    }
}
