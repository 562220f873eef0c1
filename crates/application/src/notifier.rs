//! 通知扇出
//!
//! 命令处理完成并持久化之后，由这里把事件推给相关连接。
//! 推送失败只记日志不上抛，绝不让已落库的命令因此失败。

use std::sync::Arc;

use domain::{ConnectionId, RoomId, UserId};
use uuid::Uuid;

use crate::dto::MessageDto;
use crate::events::ServerEvent;
use crate::transport::GroupTransport;

pub struct ChatNotifier {
    transport: Arc<dyn GroupTransport>,
}

impl ChatNotifier {
    pub fn new(transport: Arc<dyn GroupTransport>) -> Self {
        Self { transport }
    }

    /// 将连接订阅到房间组
    pub async fn subscribe(&self, connection_id: ConnectionId, room_id: RoomId) {
        if let Err(err) = self.transport.join_group(connection_id, room_id).await {
            tracing::warn!(
                "failed to subscribe connection {} to room {}: {}",
                connection_id,
                room_id,
                err
            );
        }
    }

    /// 将连接从房间组退订
    pub async fn unsubscribe(&self, connection_id: ConnectionId, room_id: RoomId) {
        if let Err(err) = self.transport.leave_group(connection_id, room_id).await {
            tracing::warn!(
                "failed to unsubscribe connection {} from room {}: {}",
                connection_id,
                room_id,
                err
            );
        }
    }

    /// 新消息推给房间内全部订阅连接（包括发送者自己的连接）
    pub async fn message_received(&self, room_id: RoomId, message: MessageDto) {
        let event = ServerEvent::ReceiveMessage { message };
        if let Err(err) = self.transport.send_to_group(room_id, event, None).await {
            tracing::warn!("failed to broadcast message to room {}: {}", room_id, err);
        }
    }

    /// 输入中提示推给房间内除发送者连接外的订阅连接
    pub async fn user_typing(&self, room_id: RoomId, username: &str, sender: ConnectionId) {
        let event = ServerEvent::UserTyping {
            room_id: Uuid::from(room_id),
            username: username.to_owned(),
        };
        if let Err(err) = self
            .transport
            .send_to_group(room_id, event, Some(sender))
            .await
        {
            tracing::warn!(
                "failed to broadcast typing in room {} for {}: {}",
                room_id,
                username,
                err
            );
        }
    }

    /// 上线通知推给除当事连接外的全部连接
    pub async fn user_online(&self, user_id: UserId, username: &str, connection: ConnectionId) {
        let event = ServerEvent::UserOnline {
            user_id: Uuid::from(user_id),
            username: username.to_owned(),
        };
        if let Err(err) = self.transport.send_to_all_except(connection, event).await {
            tracing::warn!("failed to broadcast online status of {}: {}", user_id, err);
        }
    }

    /// 下线通知推给除当事连接外的全部连接
    pub async fn user_offline(&self, user_id: UserId, username: &str, connection: ConnectionId) {
        let event = ServerEvent::UserOffline {
            user_id: Uuid::from(user_id),
            username: username.to_owned(),
        };
        if let Err(err) = self.transport.send_to_all_except(connection, event).await {
            tracing::warn!("failed to broadcast offline status of {}: {}", user_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockGroupTransport, TransportError};
    use mockall::predicate::eq;

    fn ids() -> (RoomId, ConnectionId) {
        (
            RoomId::from(Uuid::new_v4()),
            ConnectionId::from(Uuid::new_v4()),
        )
    }

    #[tokio::test]
    async fn typing_excludes_the_sender_connection() {
        let (room_id, sender) = ids();
        let mut transport = MockGroupTransport::new();
        transport
            .expect_send_to_group()
            .with(
                eq(room_id),
                eq(ServerEvent::UserTyping {
                    room_id: Uuid::from(room_id),
                    username: "alice".to_owned(),
                }),
                eq(Some(sender)),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = ChatNotifier::new(Arc::new(transport));
        notifier.user_typing(room_id, "alice", sender).await;
    }

    #[tokio::test]
    async fn message_broadcast_targets_the_whole_group() {
        let (room_id, _) = ids();
        let message = MessageDto {
            id: Uuid::new_v4(),
            room_id: Uuid::from(room_id),
            sender_id: Uuid::new_v4(),
            sender_username: "alice".to_owned(),
            content: "hi".to_owned(),
            sent_at: chrono::Utc::now(),
        };

        let mut transport = MockGroupTransport::new();
        transport
            .expect_send_to_group()
            .withf(|_, _, exclude| exclude.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = ChatNotifier::new(Arc::new(transport));
        notifier.message_received(room_id, message).await;
    }

    #[tokio::test]
    async fn presence_broadcast_skips_the_subject_connection() {
        let (_, connection) = ids();
        let user_id = UserId::from(Uuid::new_v4());

        let mut transport = MockGroupTransport::new();
        transport
            .expect_send_to_all_except()
            .with(
                eq(connection),
                eq(ServerEvent::UserOnline {
                    user_id: Uuid::from(user_id),
                    username: "alice".to_owned(),
                }),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let notifier = ChatNotifier::new(Arc::new(transport));
        notifier.user_online(user_id, "alice", connection).await;
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let (room_id, _) = ids();
        let mut transport = MockGroupTransport::new();
        transport
            .expect_send_to_group()
            .returning(|_, _, _| Err(TransportError::failed("down")));

        let notifier = ChatNotifier::new(Arc::new(transport));
        let message = MessageDto {
            id: Uuid::new_v4(),
            room_id: Uuid::from(room_id),
            sender_id: Uuid::new_v4(),
            sender_username: "alice".to_owned(),
            content: "hi".to_owned(),
            sent_at: chrono::Utc::now(),
        };
        // 只记日志，不 panic 也不返回错误
        notifier.message_received(room_id, message).await;
    }
}
