//! 领域错误定义
//!
//! 领域层只描述"哪条规则被违反了"，HTTP 状态码的映射放在 web 层。

use thiserror::Error;

/// 领域操作结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 领域规则错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 入参校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 不能和自己发起私聊
    #[error("cannot start a private chat with yourself")]
    SelfChat,

    /// 私聊人数上限为 2
    #[error("a private chat cannot have more than two participants")]
    PrivateChatFull,

    /// 用户已经在房间里
    #[error("user is already a member of this room")]
    UserAlreadyInRoom,

    /// 用户不在房间里
    #[error("user is not a member of this room")]
    UserNotInRoom,

    /// 私聊不允许拉人
    #[error("cannot add participants to a private chat")]
    RoomIsPrivate,

    /// 权限不足
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// 聊天室不存在
    #[error("chat room not found")]
    RoomNotFound,

    /// 用户不存在
    #[error("user not found")]
    UserNotFound,

    /// 消息不存在
    #[error("message not found")]
    MessageNotFound,

    /// 邮箱已被注册
    #[error("user already exists")]
    UserAlreadyExists,
}

impl DomainError {
    /// 创建入参校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// 记录不存在
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("conflicting record")]
    Conflict,

    /// 底层存储故障
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    /// 创建存储故障错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
