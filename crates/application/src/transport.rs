//! 推送通道抽象
//!
//! 对应实时推送所需的五个原语：加组、退组、按组发送、全员
//! 发送、排除单连接的全员发送。进程内实现维护连接注册表，
//! 分布式部署可替换为共享通道实现。

use async_trait::async_trait;
use domain::{ConnectionId, RoomId};
use thiserror::Error;

use crate::events::ServerEvent;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport failed: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupTransport: Send + Sync {
    /// 将连接加入房间组
    async fn join_group(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), TransportError>;

    /// 将连接移出房间组
    async fn leave_group(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), TransportError>;

    /// 向房间组内所有连接发送事件，`exclude` 指定要跳过的连接
    async fn send_to_group(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> Result<(), TransportError>;

    /// 向全部连接发送事件
    async fn send_to_all(&self, event: ServerEvent) -> Result<(), TransportError>;

    /// 向除指定连接外的全部连接发送事件
    async fn send_to_all_except(
        &self,
        connection_id: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), TransportError>;
}
