//! 主应用程序入口
//!
//! 启动 Axum Web API 服务。配置了 DATABASE_URL 时使用 Postgres
//! 仓储并自动执行迁移，否则回退到进程内存储（适合本地开发）。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use application::{
    ChatNotifier, ChatService, ChatServiceDependencies, Clock, InMemoryPresenceTracker,
    PresenceTracker, SystemClock, UnreadService, UnreadServiceDependencies, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use domain::{ChatRoomRepository, MessageRepository, ReadReceiptRepository, UserRepository};
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, InMemoryChatRoomRepository, InMemoryMessageRepository,
    InMemoryReadReceiptRepository, InMemoryUserRepository, LocalGroupTransport, PgStorage,
    MIGRATOR,
};
use web_api::{router, AppState, JwtService};

type Repositories = (
    Arc<dyn UserRepository>,
    Arc<dyn ChatRoomRepository>,
    Arc<dyn MessageRepository>,
    Arc<dyn ReadReceiptRepository>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate().context("invalid configuration")?;

    let (user_repository, room_repository, message_repository, receipt_repository): Repositories =
        match config.database.url.as_deref() {
            Some(url) => {
                tracing::info!(
                    "Connecting to database {}",
                    url.split('@').next_back().unwrap_or("unknown")
                );
                let pool = create_pg_pool(url, config.database.max_connections)
                    .await
                    .context("failed to connect to database")?;
                MIGRATOR
                    .run(&pool)
                    .await
                    .context("failed to run database migrations")?;

                let storage = PgStorage::new(pool);
                (
                    storage.user_repository,
                    storage.room_repository,
                    storage.message_repository,
                    storage.receipt_repository,
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                (
                    Arc::new(InMemoryUserRepository::new()),
                    Arc::new(InMemoryChatRoomRepository::new()),
                    Arc::new(InMemoryMessageRepository::new()),
                    Arc::new(InMemoryReadReceiptRepository::new()),
                )
            }
        };

    let transport = Arc::new(LocalGroupTransport::new());
    let notifier = Arc::new(ChatNotifier::new(transport.clone()));
    let presence: Arc<dyn PresenceTracker> = Arc::new(InMemoryPresenceTracker::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let password_hasher = Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));

    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        user_repository: user_repository.clone(),
        password_hasher,
        clock: clock.clone(),
    }));
    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        room_repository: room_repository.clone(),
        message_repository: message_repository.clone(),
        user_repository,
        clock: clock.clone(),
        notifier: notifier.clone(),
        presence: presence.clone(),
    }));
    let unread_service = Arc::new(UnreadService::new(UnreadServiceDependencies {
        room_repository,
        message_repository,
        receipt_repository,
        clock,
    }));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        user_service,
        chat_service,
        unread_service,
        jwt_service,
        presence,
        transport,
        notifier,
    );

    let app = router(state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Chat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
