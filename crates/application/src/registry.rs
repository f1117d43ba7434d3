//! 进程内连接注册表。
//!
//! 每个用户一个房间，房间内保存该用户所有连接的发送端。
//! 推送使用 `try_send`：队列已满的连接丢弃本次事件，已关闭的连接被清理。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::UserId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::broadcaster::{
    BroadcastError, ConnectionId, ConnectionRegistry, MessageBroadcaster, RealtimeEvent,
    Subscription,
};

const DEFAULT_CAPACITY: usize = 64;

pub struct LocalConnectionRegistry {
    rooms: RwLock<HashMap<UserId, HashMap<ConnectionId, mpsc::Sender<RealtimeEvent>>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for LocalConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    async fn prune(&self, user_id: UserId, closed: &[ConnectionId]) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(&user_id) {
            for id in closed {
                room.remove(id);
            }
            if room.is_empty() {
                rooms.remove(&user_id);
            }
        }
    }
}

#[async_trait]
impl ConnectionRegistry for LocalConnectionRegistry {
    async fn join(&self, user_id: UserId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
        info!(user_id = %user_id, connection_id, "连接加入用户房间");
        Subscription {
            connection_id,
            user_id,
            receiver,
        }
    }

    async fn leave(&self, user_id: UserId, connection_id: ConnectionId) {
        self.prune(user_id, &[connection_id]).await;
        info!(user_id = %user_id, connection_id, "连接离开用户房间");
    }

    async fn connection_count(&self, user_id: UserId) -> usize {
        self.rooms
            .read()
            .await
            .get(&user_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroadcaster for LocalConnectionRegistry {
    async fn emit(&self, user_id: UserId, event: RealtimeEvent) -> Result<usize, BroadcastError> {
        let targets: Vec<(ConnectionId, mpsc::Sender<RealtimeEvent>)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(&user_id) {
                Some(room) => room.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return Ok(0),
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (connection_id, sender) in targets {
            match sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(user_id = %user_id, connection_id, "连接队列已满，丢弃事件");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(connection_id),
            }
        }
        if !closed.is_empty() {
            self.prune(user_id, &closed).await;
        }
        Ok(delivered)
    }
}
