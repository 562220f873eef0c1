//! 进程内存储实现
//!
//! 供测试和无数据库演示运行使用，语义与 Postgres 实现一致：
//! 房间覆盖保存、参与者整体替换、私聊按规范用户对幂等创建。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use domain::{
    ChatRoom, ChatRoomRepository, Message, MessageRepository, ReadReceipt, ReadReceiptRepository,
    RepositoryError, RoomId, Timestamp, User, UserEmail, UserId, UserRepository,
};

/// 内存用户仓储
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict);
        }
        if users.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn search_by_username(
        &self,
        term: &str,
        exclude: UserId,
        limit: u32,
    ) -> Result<Vec<User>, RepositoryError> {
        let needle = term.to_lowercase();
        let users = self.users.read().await;
        let mut found: Vec<User> = users
            .values()
            .filter(|user| user.id != exclude)
            .filter(|user| user.username.as_str().to_lowercase().contains(&needle))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        found.truncate(limit as usize);
        Ok(found)
    }
}

/// 内存聊天室仓储
#[derive(Default)]
pub struct InMemoryChatRoomRepository {
    rooms: RwLock<HashMap<RoomId, ChatRoom>>,
}

impl InMemoryChatRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id()) {
            return Err(RepositoryError::Conflict);
        }
        rooms.insert(room.id(), room.clone());
        Ok(room)
    }

    async fn create_private_if_absent(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        // 查找和插入同在一把写锁内，并发创建只会留下一个房间
        let mut rooms = self.rooms.write().await;
        let pair = match room.participants() {
            [a, b] => ChatRoom::private_pair(*a, *b),
            _ => return Err(RepositoryError::storage("private room must hold a pair")),
        };

        if let Some(existing) = rooms.values().find(|candidate| {
            candidate.is_private()
                && matches!(
                    candidate.participants(),
                    [a, b] if ChatRoom::private_pair(*a, *b) == pair
                )
        }) {
            return Ok(existing.clone());
        }

        rooms.insert(room.id(), room.clone());
        Ok(room)
    }

    async fn update(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.write().await;
        if !rooms.contains_key(&room.id()) {
            return Err(RepositoryError::NotFound);
        }
        rooms.insert(room.id(), room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(&id).cloned())
    }

    async fn find_private_by_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let pair = ChatRoom::private_pair(a, b);
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .find(|room| {
                room.is_private()
                    && matches!(
                        room.participants(),
                        [x, y] if ChatRoom::private_pair(*x, *y) == pair
                    )
            })
            .cloned())
    }

    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .filter(|room| room.is_participant(user_id))
            .cloned()
            .collect())
    }
}

/// 内存消息仓储
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<RoomId, Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        let room_messages = messages.entry(message.room_id).or_default();
        if room_messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        room_messages.push(message.clone());
        Ok(message)
    }

    async fn page_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut page: Vec<Message> = messages
            .get(&room_id)
            .map(|room_messages| {
                room_messages
                    .iter()
                    .filter(|message| before.map_or(true, |cut| message.created_at < cut))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        page.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.0.cmp(&a.id.0))
        });
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn count_since(
        &self,
        room_id: RoomId,
        exclude_sender: UserId,
        after: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .get(&room_id)
            .map(|room_messages| {
                room_messages
                    .iter()
                    .filter(|message| message.sender_id != exclude_sender)
                    .filter(|message| after.map_or(true, |mark| message.created_at > mark))
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

/// 内存已读回执仓储
#[derive(Default)]
pub struct InMemoryReadReceiptRepository {
    receipts: RwLock<HashMap<(UserId, RoomId), ReadReceipt>>,
}

impl InMemoryReadReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadReceiptRepository for InMemoryReadReceiptRepository {
    async fn upsert(&self, receipt: ReadReceipt) -> Result<(), RepositoryError> {
        let mut receipts = self.receipts.write().await;
        receipts.insert((receipt.user_id, receipt.room_id), receipt);
        Ok(())
    }

    async fn find(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<Option<ReadReceipt>, RepositoryError> {
        let receipts = self.receipts.read().await;
        Ok(receipts.get(&(user_id, room_id)).cloned())
    }

    async fn find_for_user(&self, user_id: UserId) -> Result<Vec<ReadReceipt>, RepositoryError> {
        let receipts = self.receipts.read().await;
        Ok(receipts
            .values()
            .filter(|receipt| receipt.user_id == user_id)
            .cloned()
            .collect())
    }
}
