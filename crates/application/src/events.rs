//! 推送给客户端的事件
//!
//! 以 `type` 字段作为事件名序列化成 JSON 帧，客户端按事件名
//! 注册回调。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageDto;

/// 服务端推送事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// 房间内有新消息
    ReceiveMessage { message: MessageDto },
    /// 有人正在输入（不会回送给输入者本人）
    UserTyping { room_id: Uuid, username: String },
    /// 用户上线（仅 0→1 边沿）
    UserOnline { user_id: Uuid, username: String },
    /// 用户下线（仅 1→0 边沿）
    UserOffline { user_id: Uuid, username: String },
    /// 在线用户快照，仅回复请求方连接
    OnlineUsers { user_ids: Vec<Uuid> },
}
