//! 在线状态跟踪
//!
//! 按连接计数：一个用户可以同时持有多条 WebSocket 连接，
//! 只有 0→1 和 1→0 的边沿变化才对外发出上线/下线信号，
//! 中间的连接增减不产生任何广播。

use crate::error::ApplicationError;
use domain::{ConnectionId, UserId};

/// 连接计数变化产生的边沿信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    /// 连接数从 0 变为 1，用户刚上线
    CameOnline,
    /// 连接数从 1 变为 0，用户刚下线
    WentOffline,
    /// 其余情形，不需要广播
    Unchanged,
}

/// 在线状态跟踪器
///
/// 单进程部署下内存实现即为权威数据源；多节点部署时以相同
/// 契约替换为共享存储实现即可，调用方不感知。
#[async_trait::async_trait]
pub trait PresenceTracker: Send + Sync {
    /// 记录一条新连接，返回是否触发上线边沿
    async fn connect(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<PresenceChange, ApplicationError>;

    /// 移除一条连接，返回是否触发下线边沿。
    /// 未知的连接ID是无害的空操作。
    async fn disconnect(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<PresenceChange, ApplicationError>;

    /// 当前在线用户快照（至少持有一条连接的用户）
    async fn snapshot(&self) -> Result<Vec<UserId>, ApplicationError>;

    /// 用户是否在线
    async fn is_online(&self, user_id: UserId) -> Result<bool, ApplicationError>;

    /// 用户当前持有的全部连接
    async fn connections(&self, user_id: UserId) -> Result<Vec<ConnectionId>, ApplicationError>;
}

/// 内存实现
pub mod memory {
    use std::collections::{HashMap, HashSet};

    use tokio::sync::RwLock;

    use super::{PresenceChange, PresenceTracker};
    use crate::error::ApplicationError;
    use domain::{ConnectionId, UserId};

    /// 基于进程内哈希表的在线状态跟踪器
    #[derive(Default)]
    pub struct InMemoryPresenceTracker {
        /// 用户 -> 活跃连接集合
        connections: RwLock<HashMap<UserId, HashSet<ConnectionId>>>,
    }

    impl InMemoryPresenceTracker {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait::async_trait]
    impl PresenceTracker for InMemoryPresenceTracker {
        async fn connect(
            &self,
            user_id: UserId,
            connection_id: ConnectionId,
        ) -> Result<PresenceChange, ApplicationError> {
            let mut connections = self.connections.write().await;
            let entry = connections.entry(user_id).or_default();
            let was_offline = entry.is_empty();
            let inserted = entry.insert(connection_id);

            // 边沿判定必须和插入发生在同一把写锁内，
            // 并发的首连接只会有一个拿到上线信号
            if was_offline && inserted {
                Ok(PresenceChange::CameOnline)
            } else {
                Ok(PresenceChange::Unchanged)
            }
        }

        async fn disconnect(
            &self,
            user_id: UserId,
            connection_id: ConnectionId,
        ) -> Result<PresenceChange, ApplicationError> {
            let mut connections = self.connections.write().await;
            let Some(entry) = connections.get_mut(&user_id) else {
                return Ok(PresenceChange::Unchanged);
            };

            if !entry.remove(&connection_id) {
                return Ok(PresenceChange::Unchanged);
            }

            if entry.is_empty() {
                connections.remove(&user_id);
                Ok(PresenceChange::WentOffline)
            } else {
                Ok(PresenceChange::Unchanged)
            }
        }

        async fn snapshot(&self) -> Result<Vec<UserId>, ApplicationError> {
            let connections = self.connections.read().await;
            Ok(connections.keys().copied().collect())
        }

        async fn is_online(&self, user_id: UserId) -> Result<bool, ApplicationError> {
            let connections = self.connections.read().await;
            Ok(connections.contains_key(&user_id))
        }

        async fn connections(
            &self,
            user_id: UserId,
        ) -> Result<Vec<ConnectionId>, ApplicationError> {
            let connections = self.connections.read().await;
            Ok(connections
                .get(&user_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default())
        }
    }

}
