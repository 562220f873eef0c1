use std::sync::Arc;

use application::{
    ChatNotifier, ChatService, ChatServiceDependencies, Clock, InMemoryPresenceTracker,
    PresenceTracker, SystemClock, UnreadService, UnreadServiceDependencies, UserService,
    UserServiceDependencies,
};
use axum::Router;
use infrastructure::{
    BcryptPasswordHasher, InMemoryChatRoomRepository, InMemoryMessageRepository,
    InMemoryReadReceiptRepository, InMemoryUserRepository, LocalGroupTransport,
};
use web_api::{router, AppState, JwtConfig, JwtService};

pub const TEST_JWT_SECRET: &str = "integration-test-secret-key-0123456789abcdef";

// 全内存栈，每个测试各自一套状态，互不干扰
pub fn build_state() -> AppState {
    let users = Arc::new(InMemoryUserRepository::new());
    let rooms = Arc::new(InMemoryChatRoomRepository::new());
    let messages = Arc::new(InMemoryMessageRepository::new());
    let receipts = Arc::new(InMemoryReadReceiptRepository::new());
    let transport = Arc::new(LocalGroupTransport::new());
    let presence: Arc<dyn PresenceTracker> = Arc::new(InMemoryPresenceTracker::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(ChatNotifier::new(transport.clone()));

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        room_repository: rooms.clone(),
        message_repository: messages.clone(),
        user_repository: users.clone(),
        clock: clock.clone(),
        notifier: notifier.clone(),
        presence: presence.clone(),
    }));
    let unread_service = Arc::new(UnreadService::new(UnreadServiceDependencies {
        room_repository: rooms,
        message_repository: messages,
        receipt_repository: receipts,
        clock: clock.clone(),
    }));
    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        user_repository: users,
        password_hasher: Arc::new(BcryptPasswordHasher::new(Some(4))),
        clock,
    }));

    let jwt_service = Arc::new(JwtService::new(JwtConfig {
        secret: TEST_JWT_SECRET.to_string(),
        expiration_hours: 24,
    }));

    AppState::new(
        user_service,
        chat_service,
        unread_service,
        jwt_service,
        presence,
        transport,
        notifier,
    )
}

pub fn build_router() -> Router {
    router(build_state())
}
