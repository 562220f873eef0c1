//! 消息实体
//!
//! 消息一经创建即不可变，没有编辑和删除操作。

use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一ID
    pub id: MessageId,
    /// 所属房间ID
    pub room_id: RoomId,
    /// 发送者ID
    pub sender_id: UserId,
    /// 消息内容
    pub content: MessageContent,
    /// 服务器分配的发送时间
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            created_at,
        }
    }
}
