//! 领域事件
//!
//! 聚合操作以返回值的形式产出事件，由应用层决定持久化之后
//! 是否以及如何对外广播，领域层不持有任何回调。

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// 消息已追加到房间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAppended {
    /// 新追加的消息
    pub message: Message,
}

impl MessageAppended {
    pub fn new(message: Message) -> Self {
        Self { message }
    }
}
