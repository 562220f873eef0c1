//! 基础设施层实现。
//!
//! 提供数据库仓储、密码哈希、进程内传输等适配器，实现应用/领域层定义的接口。

pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;
pub mod transport;

pub use memory::{
    InMemoryChatRoomRepository, InMemoryMessageRepository, InMemoryReadReceiptRepository,
    InMemoryUserRepository,
};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgChatRoomRepository, PgMessageRepository, PgReadReceiptRepository, PgStorage,
    PgUserRepository,
};
pub use transport::{LocalGroupTransport, SharedGroupTransport};
