//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、授权检查、
//! 以及对外部适配器（密码哈希、在线状态、实时推送通道）的抽象。

pub mod clock;
pub mod dto;
pub mod error;
pub mod events;
pub mod notifier;
pub mod password;
pub mod presence;
pub mod services;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use dto::{ChatHistoryDto, MessageDto, RoomDto, RoomUnreadDto, UserDto};
pub use error::ApplicationError;
pub use events::ServerEvent;
pub use notifier::ChatNotifier;
pub use password::{PasswordHasher, PasswordHasherError};
pub use presence::{memory::InMemoryPresenceTracker, PresenceChange, PresenceTracker};
pub use services::{
    AddRoomMemberRequest, AuthenticateUserRequest, ChatHistoryRequest, ChatService,
    ChatServiceDependencies, CreatePrivateChatRequest, CreatePublicRoomRequest, JoinRoomRequest,
    RegisterUserRequest, SendMessageRequest, UnreadService, UnreadServiceDependencies,
    UserService, UserServiceDependencies,
};
pub use transport::{GroupTransport, TransportError};
