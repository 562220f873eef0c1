//! 已读回执实体
//!
//! 每个 (用户, 房间) 至多一条回执，记录最后一次"标记已读"的时间。

use serde::{Deserialize, Serialize};

use crate::value_objects::{RoomId, Timestamp, UserId};

/// 已读回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// 用户ID
    pub user_id: UserId,
    /// 房间ID
    pub room_id: RoomId,
    /// 最后已读时间
    pub last_read_at: Timestamp,
}

impl ReadReceipt {
    pub fn new(user_id: UserId, room_id: RoomId, last_read_at: Timestamp) -> Self {
        Self {
            user_id,
            room_id,
            last_read_at,
        }
    }

    /// 无条件覆盖已读时间。时钟回拨会让未读数回升，调用方
    /// 统一使用服务器时钟以避免客户端时间参与计算。
    pub fn advance_to(&mut self, at: Timestamp) {
        self.last_read_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn advance_overwrites_unconditionally() {
        let now = Utc::now();
        let mut receipt = ReadReceipt::new(
            UserId::from(Uuid::new_v4()),
            RoomId::from(Uuid::new_v4()),
            now,
        );

        let earlier = now - Duration::minutes(5);
        receipt.advance_to(earlier);
        assert_eq!(receipt.last_read_at, earlier);
    }
}
