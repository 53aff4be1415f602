//! End-to-end session tests against a server bound to an ephemeral port.
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use session_relay::cluster::{Bus, LocalBus};
use session_relay::config::{GatewayConfig, LogFormat};
use session_relay::server::{self, Background};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        socket_path: "/socket".to_string(),
        api_key: "hello".to_string(),
        default_user_id: "zhangsan".to_string(),
        heartbeat_tolerance_ms: 30_000,
        heartbeat_timeout_ms: 30_000,
        sweep_interval: Duration::from_secs(3600),
        redis_url: None,
        broadcast_channel: "redis-broadcast".to_string(),
        event_bus_capacity: 64,
        log_format: LogFormat::Text,
    }
}

async fn spawn_server() -> (SocketAddr, Background) {
    let config = test_config();
    let bus = Bus::Local(LocalBus::new(config.event_bus_capacity));
    let (app, background) = server::start(&config, bus).await;
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, background)
}

async fn open(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/socket")).await.unwrap();
    ws
}

async fn next_frame(ws: &mut Client) -> Message {
    let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), ws.next()).await else {
        panic!("no frame within timeout");
    };
    msg
}

async fn next_json(ws: &mut Client) -> Value {
    match next_frame(ws).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn authenticate(ws: &mut Client, user: &str) -> String {
    send_json(
        ws,
        serde_json::json!({"msgType": "auth", "apiKey": "hello", "userId": user}),
    )
    .await;
    let reply = next_json(ws).await;
    assert_eq!(reply["msgType"], "auth-result");
    assert_eq!(reply["code"], 0);
    reply["sessionId"].as_str().unwrap().to_string()
}

fn close_code(msg: &Message) -> Option<u16> {
    match msg {
        Message::Close(Some(frame)) => Some(u16::from(frame.code)),
        _ => None,
    }
}

#[tokio::test]
async fn auth_heartbeat_and_command_round_trip() {
    let (addr, background) = spawn_server().await;
    let mut ws = open(addr).await;

    let session_id = authenticate(&mut ws, "alice").await;

    let now = chrono::Utc::now().timestamp_millis();
    send_json(
        &mut ws,
        serde_json::json!({"msgType": "heartbeat", "sessionId": session_id, "time": now}),
    )
    .await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["msgType"], "heartbeat-result");
    assert_eq!(reply["code"], 0);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/users/alice/commands"))
        .json(&serde_json::json!({"context": "refresh"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let command = next_json(&mut ws).await;
    assert_eq!(command["msgType"], "command");
    assert_eq!(command["userId"], "alice");
    assert_eq!(command["context"], "refresh");

    background.abort();
}

#[tokio::test]
async fn junk_frames_get_no_reply() {
    let (addr, background) = spawn_server().await;
    let mut ws = open(addr).await;

    ws.send(Message::text("not json")).await.unwrap();
    send_json(&mut ws, serde_json::json!({"msgType": "mystery"})).await;
    send_json(
        &mut ws,
        serde_json::json!({"msgType": "kick", "userId": "x", "lastHeartbeat": 1, "time": 1}),
    )
    .await;

    // the first reply on the socket belongs to the auth sent afterwards
    authenticate(&mut ws, "carol").await;
    background.abort();
}

#[tokio::test]
async fn bad_credential_is_answered_then_closed() {
    let (addr, background) = spawn_server().await;
    let mut ws = open(addr).await;

    send_json(
        &mut ws,
        serde_json::json!({"msgType": "auth", "apiKey": "wrong"}),
    )
    .await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["msgType"], "auth-result");
    assert_eq!(reply["code"], -1);
    assert!(reply.get("sessionId").is_none());

    let close = next_frame(&mut ws).await;
    assert_eq!(close_code(&close), Some(1008));
    background.abort();
}

#[tokio::test]
async fn newer_session_kicks_older_one() {
    let (addr, background) = spawn_server().await;

    let mut first = open(addr).await;
    authenticate(&mut first, "dave").await;
    // distinct millisecond stamps for the two sessions
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut second = open(addr).await;
    let second_session = authenticate(&mut second, "dave").await;

    let close = next_frame(&mut first).await;
    assert_eq!(close_code(&close), Some(1000));

    let now = chrono::Utc::now().timestamp_millis();
    send_json(
        &mut second,
        serde_json::json!({"msgType": "heartbeat", "sessionId": second_session, "time": now}),
    )
    .await;
    let reply = next_json(&mut second).await;
    assert_eq!(reply["code"], 0);
    background.abort();
}
