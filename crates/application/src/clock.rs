//! 时钟端口
//!
//! 时间统一从这里取。消息时间戳的单调性约束和测试用的
//! 步进时钟都依赖这个注入点。

use domain::Timestamp;

/// 当前时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// 系统时钟
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}
