mod chat_service;
mod unread_service;
mod user_service;

pub use chat_service::{
    AddRoomMemberRequest, ChatHistoryRequest, ChatService, ChatServiceDependencies,
    CreatePrivateChatRequest, CreatePublicRoomRequest, JoinRoomRequest, SendMessageRequest,
};
pub use unread_service::{UnreadService, UnreadServiceDependencies};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};
