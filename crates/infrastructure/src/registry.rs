//! 网关连接注册表
//!
//! 作用域限定在单个网关实例的在线连接表：连接 → 用户、出站通道、
//! 已加入的房间。同时实现应用层的扇出端口。投递是至多一次、
//! 尽力而为：通道已关闭的连接直接跳过，错过的事件靠历史回放恢复。
//! 多实例部署需要在此之上引入共享的 pub/sub 层。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use application::fanout::{EventFanout, FanoutError};
use domain::{Room, ServerEvent, UserId};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub type ConnectionId = Uuid;

struct ConnectionEntry {
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    /// 每用户一条持久连接；新连接登记时替换旧连接
    users: HashMap<UserId, ConnectionId>,
    rooms: HashMap<Room, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn join(&mut self, connection_id: ConnectionId, room: Room) {
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.rooms.insert(room);
            self.rooms.entry(room).or_default().insert(connection_id);
        }
    }

    fn leave(&mut self, connection_id: ConnectionId, room: &Room) {
        let emptied = match self.rooms.get_mut(room) {
            Some(members) => {
                members.remove(&connection_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove(room);
        }
    }

    fn drop_connection(&mut self, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(&connection_id)?;
        for room in entry.rooms.clone() {
            self.leave(connection_id, &room);
        }
        if self.users.get(&entry.user_id) == Some(&connection_id) {
            self.users.remove(&entry.user_id);
        }
        Some(entry)
    }
}

#[derive(Default)]
pub struct InMemoryConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条已认证的连接。自动加入其私有用户房间；
    /// 同一用户的旧连接被替换。
    pub async fn register(
        &self,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let mut state = self.state.write().await;

        if let Some(stale) = state.users.get(&user_id).copied() {
            state.drop_connection(stale);
            debug!(user_id = %user_id, "replaced stale connection");
        }

        state.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );
        state.users.insert(user_id, connection_id);
        state.join(connection_id, Room::user(user_id));

        info!(user_id = %user_id, connection_id = %connection_id, "connection registered");
        connection_id
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        if state.drop_connection(connection_id).is_some() {
            info!(connection_id = %connection_id, "connection unregistered");
        }
    }

    /// 会话/订单房间需要显式加入；私有用户房间在登记时已自动加入。
    pub async fn join_room(&self, connection_id: ConnectionId, room: Room) {
        let mut state = self.state.write().await;
        state.join(connection_id, room);
    }

    pub async fn leave_room(&self, connection_id: ConnectionId, room: Room) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.rooms.remove(&room);
        }
        state.leave(connection_id, &room);
    }

    pub async fn is_user_online(&self, user_id: UserId) -> bool {
        self.state.read().await.users.contains_key(&user_id)
    }

    /// 房间扇出，可排除一条连接（输入提示不回显给发起者）。
    pub async fn publish_to_room_except(
        &self,
        room: &Room,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for connection_id in members {
            if Some(*connection_id) == except {
                continue;
            }
            if let Some(entry) = state.connections.get(connection_id) {
                if entry.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl EventFanout for InMemoryConnectionRegistry {
    async fn publish_to_room(
        &self,
        room: &Room,
        event: &ServerEvent,
    ) -> Result<usize, FanoutError> {
        Ok(self.publish_to_room_except(room, None, event).await)
    }

    async fn publish_to_user(
        &self,
        user: UserId,
        event: &ServerEvent,
    ) -> Result<usize, FanoutError> {
        self.publish_to_room(&Room::user(user), event).await
    }

    async fn broadcast_all(&self, event: &ServerEvent) -> Result<usize, FanoutError> {
        let state = self.state.read().await;
        let mut delivered = 0;
        for entry in state.connections.values() {
            if entry.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn is_user_in_room(&self, user: UserId, room: &Room) -> bool {
        let state = self.state.read().await;
        let Some(connection_id) = state.users.get(&user) else {
            return false;
        };
        state
            .rooms
            .get(room)
            .map(|members| members.contains(connection_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ConversationId;

    fn channel() -> (
        mpsc::UnboundedSender<ServerEvent>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn register_auto_joins_private_user_room() {
        let registry = InMemoryConnectionRegistry::new();
        let user = UserId::generate();
        let (tx, mut rx) = channel();

        registry.register(user, tx).await;
        assert!(registry.is_user_online(user).await);
        assert!(registry.is_user_in_room(user, &Room::user(user)).await);

        let delivered = registry
            .publish_to_user(user, &ServerEvent::Pong)
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn room_fanout_reaches_joined_connections_only() {
        let registry = InMemoryConnectionRegistry::new();
        let (alice, bob) = (UserId::generate(), UserId::generate());
        let (alice_tx, mut alice_rx) = channel();
        let (bob_tx, mut bob_rx) = channel();

        let alice_conn = registry.register(alice, alice_tx).await;
        registry.register(bob, bob_tx).await;

        let room = Room::conversation(ConversationId::generate());
        registry.join_room(alice_conn, room).await;

        let delivered = registry
            .publish_to_room(&room, &ServerEvent::Pong)
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(alice_rx.recv().await, Some(ServerEvent::Pong));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_fanout_can_exclude_the_originator() {
        let registry = InMemoryConnectionRegistry::new();
        let (alice, bob) = (UserId::generate(), UserId::generate());
        let (alice_tx, mut alice_rx) = channel();
        let (bob_tx, mut bob_rx) = channel();

        let alice_conn = registry.register(alice, alice_tx).await;
        let bob_conn = registry.register(bob, bob_tx).await;
        let room = Room::conversation(ConversationId::generate());
        registry.join_room(alice_conn, room).await;
        registry.join_room(bob_conn, room).await;

        let delivered = registry
            .publish_to_room_except(&room, Some(alice_conn), &ServerEvent::Pong)
            .await;
        assert_eq!(delivered, 1);
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(bob_rx.recv().await, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn unregister_cleans_rooms_and_presence() {
        let registry = InMemoryConnectionRegistry::new();
        let user = UserId::generate();
        let (tx, _rx) = channel();

        let conn = registry.register(user, tx).await;
        let room = Room::conversation(ConversationId::generate());
        registry.join_room(conn, room).await;

        registry.unregister(conn).await;
        assert!(!registry.is_user_online(user).await);
        assert_eq!(
            registry.publish_to_room(&room, &ServerEvent::Pong).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn new_connection_replaces_previous_for_same_user() {
        let registry = InMemoryConnectionRegistry::new();
        let user = UserId::generate();
        let (old_tx, _old_rx) = channel();
        let (new_tx, mut new_rx) = channel();

        registry.register(user, old_tx).await;
        registry.register(user, new_tx).await;

        let delivered = registry
            .publish_to_user(user, &ServerEvent::Pong)
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(new_rx.recv().await, Some(ServerEvent::Pong));
    }
}
