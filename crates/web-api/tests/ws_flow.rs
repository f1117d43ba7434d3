mod support;

use std::{net::SocketAddr, time::Duration};

use axum::http::{Method, StatusCode};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};

use support::{build_app, TestApp};

async fn serve(app: &TestApp) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = app.router.clone();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });
    (addr, shutdown_tx)
}

/// 升级完成后才加入房间，等待注册表里出现期望的连接数。
async fn wait_for_connections(app: &TestApp, user_id: UserId, expected: usize) {
    for _ in 0..100 {
        if app.state.connections.connection_count(user_id).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection count for {user_id} never reached {expected}");
}

#[tokio::test]
async fn websocket_requires_access_token() {
    let app = build_app();
    let (addr, shutdown) = serve(&app).await;

    match connect_async(format!("ws://{addr}/api/v1/ws")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        other => panic!("expected http rejection, connected={}", other.is_ok()),
    }
    match connect_async(format!("ws://{addr}/api/v1/ws?token=forged")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::UNAUTHORIZED),
        other => panic!("expected http rejection, connected={}", other.is_ok()),
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn new_message_pushed_to_receiver_connection() {
    let app = build_app();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let (addr, shutdown) = serve(&app).await;

    let (mut bob_ws, _) = connect_async(format!("ws://{addr}/api/v1/ws?token={}", bob.token))
        .await
        .expect("bob connects");
    let (mut alice_ws, _) = connect_async(format!("ws://{addr}/api/v1/ws?token={}", alice.token))
        .await
        .expect("alice connects");
    wait_for_connections(&app, bob.user_id, 1).await;
    wait_for_connections(&app, alice.user_id, 1).await;

    let sent = app
        .request(
            Method::POST,
            "/api/v1/messages",
            Some(&alice.token),
            Some(json!({ "receiverId": bob.user_id.to_string(), "message": "hello bob" })),
        )
        .await;
    assert_eq!(sent.status, StatusCode::CREATED);

    let frame = timeout(Duration::from_secs(2), bob_ws.next())
        .await
        .expect("push arrives")
        .expect("stream open")
        .expect("valid frame");
    let event: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event["event"], "newMessage");
    assert_eq!(event["data"]["message"], "hello bob");
    assert_eq!(event["data"]["senderId"], alice.user_id.to_string());
    assert_eq!(event["data"]["id"], sent.body["id"]);

    // 默认不回显给发送者
    assert!(timeout(Duration::from_millis(200), alice_ws.next())
        .await
        .is_err());

    bob_ws.send(WsMessage::Ping("hb".into())).await.unwrap();
    let pong = timeout(Duration::from_secs(2), bob_ws.next())
        .await
        .expect("pong arrives")
        .expect("stream open")
        .expect("valid frame");
    assert!(matches!(pong, WsMessage::Pong(ref data) if &data[..] == b"hb"));

    bob_ws.close(None).await.unwrap();
    wait_for_connections(&app, bob.user_id, 0).await;

    alice_ws.close(None).await.unwrap();
    let _ = shutdown.send(());
}
