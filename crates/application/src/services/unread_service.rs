//! 未读计数与已读回执
//!
//! 未读数按需计算：对用户参与的每个房间，统计他人发送且晚于
//! 最后已读时间的消息数，没有回执时统计全部他人消息。不维护
//! 任何冗余计数器。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    ChatRoomRepository, DomainError, MessageRepository, ReadReceipt, ReadReceiptRepository,
    RoomId, Timestamp, UserId,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::RoomUnreadDto;
use crate::error::ApplicationError;

pub struct UnreadServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub receipt_repository: Arc<dyn ReadReceiptRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct UnreadService {
    deps: UnreadServiceDependencies,
}

impl UnreadService {
    pub fn new(deps: UnreadServiceDependencies) -> Self {
        Self { deps }
    }

    /// 把房间标记为已读到当前服务器时间。
    ///
    /// 回执无条件覆盖，重复调用以最后一次为准。
    pub async fn mark_room_read(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<(), ApplicationError> {
        let user = UserId::from(user_id);
        let room = self
            .deps
            .room_repository
            .find_by_id(RoomId::from(room_id))
            .await?
            .ok_or(DomainError::RoomNotFound)?;

        if !room.is_participant(user) {
            return Err(DomainError::UserNotInRoom.into());
        }

        let receipt = ReadReceipt::new(user, room.id(), self.deps.clock.now());
        self.deps.receipt_repository.upsert(receipt).await?;
        Ok(())
    }

    /// 用户全部房间的未读数
    pub async fn unread_counts(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoomUnreadDto>, ApplicationError> {
        let user = UserId::from(user_id);
        let rooms = self.deps.room_repository.rooms_for_user(user).await?;
        let receipts = self.deps.receipt_repository.find_for_user(user).await?;
        let read_marks: HashMap<RoomId, Timestamp> = receipts
            .into_iter()
            .map(|receipt| (receipt.room_id, receipt.last_read_at))
            .collect();

        let mut counts = Vec::with_capacity(rooms.len());
        for room in &rooms {
            let after = read_marks.get(&room.id()).copied();
            let unread = self
                .deps
                .message_repository
                .count_since(room.id(), user, after)
                .await?;
            counts.push(RoomUnreadDto {
                room_id: Uuid::from(room.id()),
                unread_count: unread,
            });
        }

        Ok(counts)
    }
}
