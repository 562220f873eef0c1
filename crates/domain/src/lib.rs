//! 聊天服务核心领域模型
//!
//! 包含聊天室聚合、消息、已读回执等实体，以及仓储契约。

pub mod chat_room;
pub mod errors;
pub mod events;
pub mod message;
pub mod read_receipt;
pub mod repository;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::{ChatRoom, ChatRoomVisibility};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::MessageAppended;
pub use message::Message;
pub use read_receipt::ReadReceipt;
pub use repository::{
    ChatRoomRepository, MessageRepository, ReadReceiptRepository, UserRepository,
};
pub use user::User;
pub use value_objects::{
    ConnectionId, MessageContent, MessageId, PasswordHash, RoomId, RoomName, Timestamp, UserEmail,
    UserId, Username,
};
