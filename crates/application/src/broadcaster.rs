use async_trait::async_trait;
use domain::{Message, UserId};
use thiserror::Error;
use tokio::sync::mpsc;

/// 推送给已连接会话的事件，序列化为 `{"event": ..., "data": ...}`。
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "newMessage")]
    NewMessage(Message),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 按用户房间推送事件。返回送达的连接数，没有在线连接时为 0。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn emit(&self, user_id: UserId, event: RealtimeEvent) -> Result<usize, BroadcastError>;
}

pub type ConnectionId = u64;

/// 一个已加入用户房间的连接。`receiver` 关闭即视为离开。
#[derive(Debug)]
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub receiver: mpsc::Receiver<RealtimeEvent>,
}

/// 进程内或分布式的连接注册表，连接建立时加入、断开时移除。
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn join(&self, user_id: UserId) -> Subscription;
    async fn leave(&self, user_id: UserId, connection_id: ConnectionId);
    async fn connection_count(&self, user_id: UserId) -> usize;
}
