//! 数据库迁移
//!
//! 迁移脚本内嵌进二进制，启动时由入口调用 `MIGRATOR.run`。

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
