use std::sync::Arc;

use application::{ChatNotifier, ChatService, PresenceTracker, UnreadService, UserService};
use infrastructure::LocalGroupTransport;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    pub unread_service: Arc<UnreadService>,
    pub jwt_service: Arc<JwtService>,
    pub presence: Arc<dyn PresenceTracker>,
    pub transport: Arc<LocalGroupTransport>,
    pub notifier: Arc<ChatNotifier>,
}

impl AppState {
    pub fn new(
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        unread_service: Arc<UnreadService>,
        jwt_service: Arc<JwtService>,
        presence: Arc<dyn PresenceTracker>,
        transport: Arc<LocalGroupTransport>,
        notifier: Arc<ChatNotifier>,
    ) -> Self {
        Self {
            user_service,
            chat_service,
            unread_service,
            jwt_service,
            presence,
            transport,
            notifier,
        }
    }
}
