//! 仓储接口定义
//!
//! 持久化技术由基础设施层决定，领域层只约定契约。
//! 分页查询按 `created_at` 降序返回，`before` 为严格小于过滤，
//! 保证连续翻页既不重复也不遗漏。

use async_trait::async_trait;

use crate::chat_room::ChatRoom;
use crate::errors::RepositoryError;
use crate::message::Message;
use crate::read_receipt::ReadReceipt;
use crate::user::User;
use crate::value_objects::{RoomId, Timestamp, UserEmail, UserId};

/// 用户仓储
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 保存新用户，邮箱冲突返回 [`RepositoryError::Conflict`]
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    /// 按ID查找用户
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// 批量按ID查找用户，用于拼装参与者摘要
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;

    /// 按邮箱查找用户
    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError>;

    /// 按用户名模糊搜索（不区分大小写），排除指定用户
    async fn search_by_username(
        &self,
        term: &str,
        exclude: UserId,
        limit: u32,
    ) -> Result<Vec<User>, RepositoryError>;
}

/// 聊天室仓储
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 保存新房间
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;

    /// 原子地"查找或创建"私聊房间。
    ///
    /// 若该参与者对的私聊已存在则返回已有房间，否则插入传入的
    /// 房间并返回。以规范参与者对作为唯一键，并发创建也只会
    /// 留下一个房间。
    async fn create_private_if_absent(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;

    /// 覆盖保存房间（参与者列表整体替换）
    async fn update(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;

    /// 按ID查找房间
    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 查找一对用户的私聊房间（参数顺序无关）
    async fn find_private_by_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 列出用户参与的全部房间
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError>;
}

/// 消息仓储
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加一条消息，ID 冲突返回 [`RepositoryError::Conflict`]
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;

    /// 按时间降序取一页消息。
    ///
    /// `before` 存在时只返回 `created_at` 严格小于它的消息，
    /// 调用方用上一页最旧一条的时间戳继续翻页。
    async fn page_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 最新 N 条消息（降序），用于首屏展示
    async fn recent_n(&self, room_id: RoomId, n: u32) -> Result<Vec<Message>, RepositoryError> {
        self.page_before(room_id, None, n).await
    }

    /// 统计房间内他人发送、晚于 `after` 的消息数。
    ///
    /// `after` 为 `None` 时统计全部他人消息，对应从未标记已读
    /// 的场景。
    async fn count_since(
        &self,
        room_id: RoomId,
        exclude_sender: UserId,
        after: Option<Timestamp>,
    ) -> Result<u64, RepositoryError>;
}

/// 已读回执仓储
#[async_trait]
pub trait ReadReceiptRepository: Send + Sync {
    /// 插入或覆盖回执
    async fn upsert(&self, receipt: ReadReceipt) -> Result<(), RepositoryError>;

    /// 查找某用户在某房间的回执
    async fn find(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<Option<ReadReceipt>, RepositoryError>;

    /// 查找某用户的全部回执
    async fn find_for_user(&self, user_id: UserId) -> Result<Vec<ReadReceipt>, RepositoryError>;
}
