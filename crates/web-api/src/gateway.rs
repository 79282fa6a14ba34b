//! 实时网关
//!
//! 每个在线用户一条持久连接。握手时交换凭证，验证失败立即拒绝
//! 升级，不会建立任何部分会话。认证通过后自动加入私有用户房间；
//! 会话/订单房间需要显式加入。单个畸形事件只记日志丢弃，
//! 不拆除连接。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use application::fanout::EventFanout;
use domain::{ClientEvent, Room, ServerEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;
use infrastructure::ConnectionId;

/// WebSocket 握手查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// 外部认证服务签发的访问令牌
    pub token: String,
}

/// 连接升级入口。凭证验证失败 → 401，连接不会升级。
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let claims = state.jwt_service.verify_token(&query.token).map_err(|_| {
        warn!("websocket upgrade rejected: invalid token");
        StatusCode::UNAUTHORIZED
    })?;
    let user_id = UserId::from(claims.user_id);

    info!(user_id = %user_id, "websocket upgrade");
    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, user_id)))
}

/// 连接主循环：登记 → 在线广播 → 收发 → 清理。
async fn run_connection(socket: WebSocket, state: AppState, user_id: UserId) {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = state.registry.register(user_id, event_tx.clone()).await;

    if let Err(err) = state.presence.mark_online(user_id).await {
        warn!(error = %err, user_id = %user_id, "presence online failed");
    }
    if let Err(err) = state
        .registry
        .broadcast_all(&ServerEvent::UserOnline { user_id })
        .await
    {
        warn!(error = %err, "user_online broadcast failed");
    }

    let (mut sink, mut stream) = socket.split();

    // 发送任务：出站事件统一经由注册表登记的通道
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize server event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
        debug!("websocket send task finished");
    });

    // 接收任务：解析客户端事件并路由
    let recv_state = state.clone();
    let recv_tx = event_tx.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    handle_client_frame(
                        &recv_state,
                        connection_id,
                        user_id,
                        &recv_tx,
                        text.as_str(),
                    )
                    .await;
                }
                Ok(WsMessage::Binary(_)) => {
                    debug!("binary frames are not part of the event vocabulary");
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                    // 传输层心跳由底层协议栈应答
                }
                Ok(WsMessage::Close(_)) => {
                    debug!(user_id = %user_id, "websocket closed by client");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "websocket receive error");
                    break;
                }
            }
        }
        debug!("websocket receive task finished");
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    // 断开清理：注册表、在线状态、离线广播
    state.registry.unregister(connection_id).await;
    if let Err(err) = state.presence.mark_offline(user_id).await {
        warn!(error = %err, user_id = %user_id, "presence offline failed");
    }
    if let Err(err) = state
        .registry
        .broadcast_all(&ServerEvent::UserOffline {
            user_id,
            last_seen: chrono::Utc::now(),
        })
        .await
    {
        warn!(error = %err, "user_offline broadcast failed");
    }

    info!(user_id = %user_id, connection_id = %connection_id, "websocket connection cleaned up");
}

/// 处理一帧客户端事件。畸形负载记日志后丢弃，连接保持。
async fn handle_client_frame(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: UserId,
    reply: &mpsc::UnboundedSender<ServerEvent>,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, user_id = %user_id, "malformed client event dropped");
            return;
        }
    };

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            // 加入会话房间前校验参与者身份
            match state
                .conversation_service
                .get_for_participant(conversation_id, user_id)
                .await
            {
                Ok(_) => {
                    state
                        .registry
                        .join_room(connection_id, Room::conversation(conversation_id))
                        .await;
                    info!(user_id = %user_id, conversation_id = %conversation_id, "joined conversation room");
                }
                Err(_) => {
                    let _ = reply.send(ServerEvent::error(
                        "JOIN_CONVERSATION_FAILED",
                        "conversation not found",
                    ));
                }
            }
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            state
                .registry
                .leave_room(connection_id, Room::conversation(conversation_id))
                .await;
        }
        ClientEvent::JoinOrder { order_id } => {
            state
                .registry
                .join_room(connection_id, Room::order(order_id))
                .await;
        }
        ClientEvent::LeaveOrder { order_id } => {
            state
                .registry
                .leave_room(connection_id, Room::order(order_id))
                .await;
        }
        // 输入提示是瞬态信号：不持久化，后写覆盖，不回显给发起者
        ClientEvent::TypingStart { conversation_id } => {
            state
                .registry
                .publish_to_room_except(
                    &Room::conversation(conversation_id),
                    Some(connection_id),
                    &ServerEvent::UserTyping {
                        conversation_id,
                        user_id,
                    },
                )
                .await;
        }
        ClientEvent::TypingStop { conversation_id } => {
            state
                .registry
                .publish_to_room_except(
                    &Room::conversation(conversation_id),
                    Some(connection_id),
                    &ServerEvent::UserStopTyping {
                        conversation_id,
                        user_id,
                    },
                )
                .await;
        }
        ClientEvent::Ping => {
            let _ = reply.send(ServerEvent::Pong);
        }
    }
}
