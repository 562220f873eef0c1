//! 用户实体

use serde::{Deserialize, Serialize};

use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 注册用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// 用户唯一ID
    pub id: UserId,
    /// 用户名
    pub username: Username,
    /// 邮箱（登录凭据，全局唯一）
    pub email: UserEmail,
    /// 密码哈希
    pub password: PasswordHash,
    /// 注册时间
    pub created_at: Timestamp,
}

impl User {
    /// 注册新用户
    pub fn register(
        id: UserId,
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            email,
            password,
            created_at: now,
        }
    }
}
