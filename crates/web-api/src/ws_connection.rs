use application::Subscription;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// 单个已认证的 WebSocket 连接。
///
/// 连接建立时已加入用户房间；发送任务把房间事件序列化为 JSON 写出，
/// 接收任务只处理心跳与关闭。任一任务结束即离开房间。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    subscription: Subscription,
}

impl WebSocketConnection {
    pub async fn open(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        let subscription = state.connections.join(user_id).await;
        tracing::info!(
            user_id = %user_id,
            connection_id = subscription.connection_id,
            "WebSocket 连接已建立"
        );
        Self {
            socket,
            state,
            subscription,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            subscription,
        } = self;
        let Subscription {
            connection_id,
            user_id,
            receiver: mut events,
        } = subscription;

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 所有写操作集中在发送任务
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let frame = match cmd {
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        };
                        if sender.send(frame).await.is_err() {
                            tracing::warn!("WebSocket 写出失败");
                            break;
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "事件序列化失败");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!("WebSocket 推送失败");
                            break;
                        }
                    }
                }
            }
            tracing::debug!("WebSocket 发送任务结束");
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if handle_incoming(message, &cmd_tx).await.is_err() {
                    break;
                }
            }
            tracing::debug!("WebSocket 接收任务结束");
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        state.connections.leave(user_id, connection_id).await;
        tracing::info!(user_id = %user_id, connection_id, "WebSocket 连接已断开");
    }
}

/// 关闭帧或写通道失效时返回 `Err`，调用方据此结束接收循环。
async fn handle_incoming(message: WsMessage, cmd_tx: &mpsc::Sender<WsCommand>) -> Result<(), ()> {
    match message {
        WsMessage::Close(_) => return Err(()),
        WsMessage::Ping(data) => {
            if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                return Err(());
            }
        }
        WsMessage::Pong(_) => {}
        WsMessage::Text(_) | WsMessage::Binary(_) => {
            // 客户端消息走 HTTP 接口，这里忽略
            tracing::debug!("忽略客户端 WebSocket 消息");
        }
    }
    Ok(())
}

#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
