//! 实时通道全链路测试

mod support;

use std::time::Duration;

use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use support::spawn_server;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &support::TestServer, token: &str) -> WsClient {
    let (socket, _) = connect_async(server.ws_url(token)).await.unwrap();
    socket
}

/// 读取事件直到遇到指定类型（跳过在线广播等无关帧）。
async fn next_event_of_type(socket: &mut WsClient, event_type: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = socket.next().await.expect("socket closed").unwrap();
            if let Message::Text(text) = frame {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                if event["type"] == event_type {
                    return event;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn send_event(socket: &mut WsClient, event: Value) {
    socket
        .send(Message::Text(event.to_string().into()))
        .await
        .unwrap();
    // 给网关一点处理时间
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn create_conversation(server: &support::TestServer, token: &str, peer: UserId) -> String {
    let response: Value = server
        .client
        .post(server.url("/api/v1/conversations"))
        .bearer_auth(token)
        .json(&json!({ "peer": peer }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    response["id"].as_str().unwrap().to_string()
}

async fn send_text(server: &support::TestServer, token: &str, conversation_id: &str, content: &str) {
    let response = server
        .client
        .post(server.url(&format!(
            "/api/v1/conversations/{}/messages",
            conversation_id
        )))
        .bearer_auth(token)
        .json(&json!({ "content": content }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn handshake_rejects_invalid_token() {
    let server = spawn_server().await;
    let result = connect_async(server.ws_url("not-a-valid-token")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn subscribed_participant_receives_new_message() {
    let server = spawn_server().await;
    let (alice, bob) = (UserId::generate(), UserId::generate());
    let alice_token = server.token_for(alice);
    let bob_token = server.token_for(bob);

    let conversation_id = create_conversation(&server, &alice_token, bob).await;

    let mut bob_socket = connect(&server, &bob_token).await;
    send_event(
        &mut bob_socket,
        json!({ "type": "join_conversation", "conversation_id": conversation_id }),
    )
    .await;

    send_text(&server, &alice_token, &conversation_id, "Hello").await;

    let event = next_event_of_type(&mut bob_socket, "new_message").await;
    assert_eq!(event["conversation_id"].as_str().unwrap(), conversation_id);
    assert_eq!(event["message"]["content"], "Hello");
}

#[tokio::test]
async fn online_unsubscribed_participant_gets_direct_notification() {
    let server = spawn_server().await;
    let (alice, bob) = (UserId::generate(), UserId::generate());
    let alice_token = server.token_for(alice);
    let bob_token = server.token_for(bob);

    let conversation_id = create_conversation(&server, &alice_token, bob).await;

    // Bob 在线，但没有加入会话房间
    let mut bob_socket = connect(&server, &bob_token).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_text(&server, &alice_token, &conversation_id, "are you there?").await;

    let event = next_event_of_type(&mut bob_socket, "message_notification").await;
    assert_eq!(event["conversation_id"].as_str().unwrap(), conversation_id);
    assert_eq!(event["preview"], "are you there?");
}

#[tokio::test]
async fn typing_indicator_reaches_peers_but_not_originator() {
    let server = spawn_server().await;
    let (alice, bob) = (UserId::generate(), UserId::generate());
    let alice_token = server.token_for(alice);
    let bob_token = server.token_for(bob);

    let conversation_id = create_conversation(&server, &alice_token, bob).await;

    let mut alice_socket = connect(&server, &alice_token).await;
    let mut bob_socket = connect(&server, &bob_token).await;
    send_event(
        &mut alice_socket,
        json!({ "type": "join_conversation", "conversation_id": conversation_id }),
    )
    .await;
    send_event(
        &mut bob_socket,
        json!({ "type": "join_conversation", "conversation_id": conversation_id }),
    )
    .await;

    send_event(
        &mut alice_socket,
        json!({ "type": "typing_start", "conversation_id": conversation_id }),
    )
    .await;

    let event = next_event_of_type(&mut bob_socket, "user_typing").await;
    assert_eq!(
        event["user_id"].as_str().unwrap(),
        alice.to_string().as_str()
    );

    send_event(
        &mut alice_socket,
        json!({ "type": "typing_stop", "conversation_id": conversation_id }),
    )
    .await;
    let event = next_event_of_type(&mut bob_socket, "user_stop_typing").await;
    assert_eq!(event["conversation_id"].as_str().unwrap(), conversation_id);
}

#[tokio::test]
async fn malformed_event_does_not_kill_the_connection() {
    let server = spawn_server().await;
    let (alice, bob) = (UserId::generate(), UserId::generate());
    let alice_token = server.token_for(alice);

    let conversation_id = create_conversation(&server, &alice_token, bob).await;
    let mut socket = connect(&server, &alice_token).await;

    // 单个畸形事件被丢弃，连接保持
    send_event(&mut socket, json!({ "type": "launch_missiles" })).await;
    socket
        .send(Message::Text("not even json".to_string().into()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 连接仍然可用：ping 有回应，房间订阅照常工作
    send_event(&mut socket, json!({ "type": "ping" })).await;
    let event = next_event_of_type(&mut socket, "pong").await;
    assert_eq!(event["type"], "pong");

    send_event(
        &mut socket,
        json!({ "type": "join_conversation", "conversation_id": conversation_id }),
    )
    .await;
    send_text(&server, &alice_token, &conversation_id, "still alive").await;
    let event = next_event_of_type(&mut socket, "new_message").await;
    assert_eq!(event["message"]["content"], "still alive");
}

#[tokio::test]
async fn presence_broadcasts_online_and_offline() {
    let server = spawn_server().await;
    let (alice, bob) = (UserId::generate(), UserId::generate());
    let alice_token = server.token_for(alice);
    let bob_token = server.token_for(bob);

    let mut alice_socket = connect(&server, &alice_token).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 跳过 Alice 自己上线时收到的广播
    let mut bob_socket = connect(&server, &bob_token).await;
    loop {
        let event = next_event_of_type(&mut alice_socket, "user_online").await;
        if event["user_id"].as_str().unwrap() == bob.to_string().as_str() {
            break;
        }
    }

    bob_socket.close(None).await.unwrap();
    let event = next_event_of_type(&mut alice_socket, "user_offline").await;
    assert_eq!(event["user_id"].as_str().unwrap(), bob.to_string().as_str());
}
