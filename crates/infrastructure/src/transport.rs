//! 进程内群组传输
//!
//! 维护连接到事件通道的映射和房间分组，实现应用层的 `GroupTransport`。
//! 投递失败视为连接已失效，记录日志后跳过，不向调用方冒泡。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use application::{GroupTransport, ServerEvent, TransportError};
use domain::{ConnectionId, RoomId};

/// 单进程连接注册表与群组路由
#[derive(Default)]
pub struct LocalGroupTransport {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
    groups: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
}

impl LocalGroupTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接，返回该连接的事件接收端
    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut senders = self.senders.write().await;
        senders.insert(connection_id, tx);
        info!("Connection {} registered", connection_id);
        rx
    }

    /// 注销连接并将其从所有群组移除
    pub async fn unregister_connection(&self, connection_id: ConnectionId) {
        {
            let mut senders = self.senders.write().await;
            senders.remove(&connection_id);
        }
        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });
        info!("Connection {} unregistered", connection_id);
    }

    /// 当前已注册的连接数
    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    async fn deliver(&self, targets: &[ConnectionId], event: &ServerEvent) {
        let senders = self.senders.read().await;
        for connection_id in targets {
            match senders.get(connection_id) {
                Some(sender) => {
                    if sender.send(event.clone()).is_err() {
                        debug!("Connection {} channel closed, skipping", connection_id);
                    }
                }
                None => {
                    debug!("Connection {} not registered, skipping", connection_id);
                }
            }
        }
    }
}

#[async_trait]
impl GroupTransport for LocalGroupTransport {
    async fn join_group(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), TransportError> {
        let mut groups = self.groups.write().await;
        groups.entry(room_id).or_default().insert(connection_id);
        debug!("Connection {} joined group {}", connection_id, room_id);
        Ok(())
    }

    async fn leave_group(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), TransportError> {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                groups.remove(&room_id);
            }
        }
        debug!("Connection {} left group {}", connection_id, room_id);
        Ok(())
    }

    async fn send_to_group(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> Result<(), TransportError> {
        let targets: Vec<ConnectionId> = {
            let groups = self.groups.read().await;
            match groups.get(&room_id) {
                Some(members) => members
                    .iter()
                    .filter(|member| exclude != Some(**member))
                    .copied()
                    .collect(),
                None => return Ok(()),
            }
        };
        self.deliver(&targets, &event).await;
        Ok(())
    }

    async fn send_to_all(&self, event: ServerEvent) -> Result<(), TransportError> {
        let targets: Vec<ConnectionId> = {
            let senders = self.senders.read().await;
            senders.keys().copied().collect()
        };
        self.deliver(&targets, &event).await;
        Ok(())
    }

    async fn send_to_all_except(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), TransportError> {
        let targets: Vec<ConnectionId> = {
            let senders = self.senders.read().await;
            senders
                .keys()
                .filter(|candidate| **candidate != connection_id)
                .copied()
                .collect()
        };
        self.deliver(&targets, &event).await;
        Ok(())
    }
}

/// 便于各处共享同一个传输实例
pub type SharedGroupTransport = Arc<LocalGroupTransport>;

#[cfg(test)]
mod tests {
    use super::*;
    use application::ServerEvent;
    use uuid::Uuid;

    fn connection() -> ConnectionId {
        ConnectionId::new(Uuid::new_v4())
    }

    fn typing_event(room_id: RoomId) -> ServerEvent {
        ServerEvent::UserTyping {
            room_id: room_id.0,
            username: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn send_to_group_reaches_only_members() {
        let transport = LocalGroupTransport::new();
        let room = RoomId::new(Uuid::new_v4());
        let member = connection();
        let outsider = connection();

        let mut member_rx = transport.register_connection(member).await;
        let mut outsider_rx = transport.register_connection(outsider).await;
        transport.join_group(member, room).await.unwrap();

        transport
            .send_to_group(room, typing_event(room), None)
            .await
            .unwrap();

        assert!(member_rx.try_recv().is_ok());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_group_honors_exclusion() {
        let transport = LocalGroupTransport::new();
        let room = RoomId::new(Uuid::new_v4());
        let sender = connection();
        let other = connection();

        let mut sender_rx = transport.register_connection(sender).await;
        let mut other_rx = transport.register_connection(other).await;
        transport.join_group(sender, room).await.unwrap();
        transport.join_group(other, room).await.unwrap();

        transport
            .send_to_group(room, typing_event(room), Some(sender))
            .await
            .unwrap();

        assert!(sender_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_all_except_skips_one_connection() {
        let transport = LocalGroupTransport::new();
        let skipped = connection();
        let reached = connection();

        let mut skipped_rx = transport.register_connection(skipped).await;
        let mut reached_rx = transport.register_connection(reached).await;

        let event = ServerEvent::UserOnline {
            user_id: Uuid::new_v4(),
            username: "bob".to_string(),
        };
        transport.send_to_all_except(skipped, event).await.unwrap();

        assert!(skipped_rx.try_recv().is_err());
        assert!(reached_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_removes_connection_from_groups() {
        let transport = LocalGroupTransport::new();
        let room = RoomId::new(Uuid::new_v4());
        let conn = connection();

        let _rx = transport.register_connection(conn).await;
        transport.join_group(conn, room).await.unwrap();
        transport.unregister_connection(conn).await;

        assert_eq!(transport.connection_count().await, 0);
        // 投递到空群组不报错
        transport
            .send_to_group(room, typing_event(room), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_to_closed_channel_is_skipped() {
        let transport = LocalGroupTransport::new();
        let room = RoomId::new(Uuid::new_v4());
        let gone = connection();
        let alive = connection();

        let rx = transport.register_connection(gone).await;
        drop(rx);
        let mut alive_rx = transport.register_connection(alive).await;
        transport.join_group(gone, room).await.unwrap();
        transport.join_group(alive, room).await.unwrap();

        transport
            .send_to_group(room, typing_event(room), None)
            .await
            .unwrap();

        assert!(alive_rx.try_recv().is_ok());
    }
}
