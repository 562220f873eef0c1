use domain::{Message, Timestamp, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: Uuid::from(user.id),
            username: user.username.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub sent_at: Timestamp,
}

impl MessageDto {
    /// 消息本体不携带用户名，需要调用方补上发送者用户名
    pub fn from_message(message: &Message, sender_username: impl Into<String>) -> Self {
        Self {
            id: Uuid::from(message.id),
            room_id: Uuid::from(message.room_id),
            sender_id: Uuid::from(message.sender_id),
            sender_username: sender_username.into(),
            content: message.content.as_str().to_owned(),
            sent_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: Uuid,
    pub name: String,
    pub is_private: bool,
    pub creator_id: Uuid,
    pub participants: Vec<UserDto>,
    pub created_at: Timestamp,
    pub last_message_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryDto {
    /// 页内按时间升序排列，便于直接渲染
    pub messages: Vec<MessageDto>,
    /// 更早的消息是否还有下一页
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomUnreadDto {
    pub room_id: Uuid,
    pub unread_count: u64,
}
