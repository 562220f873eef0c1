//! 聊天室用例服务
//!
//! 命令处理统一走 加载聚合 → 鉴权 → 领域操作 → 持久化 → 扇出
//! 的流程，扇出失败只记日志，命令本身不受影响。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    ChatRoom, ChatRoomRepository, DomainError, MessageContent, MessageId, MessageRepository,
    RoomId, RoomName, Timestamp, User, UserId, UserRepository,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::dto::{ChatHistoryDto, MessageDto, RoomDto, UserDto};
use crate::error::ApplicationError;
use crate::notifier::ChatNotifier;
use crate::presence::PresenceTracker;

/// 历史分页默认一页 50 条
const DEFAULT_PAGE_SIZE: u32 = 50;
/// 一页最多 100 条
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CreatePrivateChatRequest {
    pub creator_id: Uuid,
    pub other_user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CreatePublicRoomRequest {
    pub creator_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AddRoomMemberRequest {
    pub actor_id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct JoinRoomRequest {
    pub user_id: Uuid,
    pub room_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: Uuid,
    pub room_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatHistoryRequest {
    pub user_id: Uuid,
    pub room_id: Uuid,
    /// 只取严格早于该时间的消息，None 表示从最新开始
    pub before: Option<Timestamp>,
    pub page_size: Option<u32>,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<ChatNotifier>,
    pub presence: Arc<dyn PresenceTracker>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 发起或复用一对一私聊。
    ///
    /// 同一对用户重复发起会拿到同一个房间，不报错也不建副本。
    pub async fn create_private_chat(
        &self,
        request: CreatePrivateChatRequest,
    ) -> Result<RoomDto, ApplicationError> {
        let creator = UserId::from(request.creator_id);
        let other = UserId::from(request.other_user_id);

        if creator == other {
            return Err(DomainError::SelfChat.into());
        }

        self.deps
            .user_repository
            .find_by_id(other)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if let Some(existing) = self
            .deps
            .room_repository
            .find_private_by_pair(creator, other)
            .await?
        {
            return self.room_dto(&existing).await;
        }

        let now = self.deps.clock.now();
        let room = ChatRoom::create_private(RoomId::from(Uuid::new_v4()), creator, other, now)?;

        // 并发下以规范用户对为唯一键，总是返回最终胜出的那个房间
        let stored = self
            .deps
            .room_repository
            .create_private_if_absent(room)
            .await?;

        self.subscribe_live_connections(creator, stored.id()).await;
        self.subscribe_live_connections(other, stored.id()).await;

        self.room_dto(&stored).await
    }

    /// 创建公开房间，创建者即管理员
    pub async fn create_public_room(
        &self,
        request: CreatePublicRoomRequest,
    ) -> Result<RoomDto, ApplicationError> {
        let creator = UserId::from(request.creator_id);
        let name = RoomName::parse(request.name)?;

        let now = self.deps.clock.now();
        let room = ChatRoom::create_public(RoomId::from(Uuid::new_v4()), name, creator, now);
        let stored = self.deps.room_repository.create(room).await?;

        self.subscribe_live_connections(creator, stored.id()).await;

        self.room_dto(&stored).await
    }

    /// 管理员把用户拉进公开房间
    pub async fn add_room_member(
        &self,
        request: AddRoomMemberRequest,
    ) -> Result<(), ApplicationError> {
        let actor = UserId::from(request.actor_id);
        let target = UserId::from(request.user_id);

        let mut room = self.load_room(RoomId::from(request.room_id)).await?;

        if !room.is_admin(actor) {
            return Err(DomainError::InsufficientPermissions.into());
        }

        self.deps
            .user_repository
            .find_by_id(target)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        if room.is_private() {
            return Err(DomainError::RoomIsPrivate.into());
        }

        if room.is_participant(target) {
            return Err(DomainError::UserAlreadyInRoom.into());
        }

        room.add_participant(target)?;
        self.deps.room_repository.update(room.clone()).await?;

        self.subscribe_live_connections(target, room.id()).await;

        Ok(())
    }

    /// 用户自助加入公开房间，重复加入是无害的空操作
    pub async fn join_room(&self, request: JoinRoomRequest) -> Result<(), ApplicationError> {
        let user = UserId::from(request.user_id);
        let mut room = self.load_room(RoomId::from(request.room_id)).await?;

        if room.is_participant(user) {
            self.subscribe_live_connections(user, room.id()).await;
            return Ok(());
        }

        if room.is_private() {
            return Err(DomainError::RoomIsPrivate.into());
        }

        room.add_participant(user)?;
        self.deps.room_repository.update(room.clone()).await?;

        self.subscribe_live_connections(user, room.id()).await;

        Ok(())
    }

    /// 发送消息：落库成功后向房间扇出，扇出失败不回滚
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessageDto, ApplicationError> {
        let sender_id = UserId::from(request.sender_id);
        let mut room = self.load_room(RoomId::from(request.room_id)).await?;

        if !room.is_participant(sender_id) {
            return Err(DomainError::UserNotInRoom.into());
        }

        let sender = self
            .deps
            .user_repository
            .find_by_id(sender_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let content = MessageContent::new(request.content)?;
        let now = self.deps.clock.now();
        let event = room.append_message(
            MessageId::from(Uuid::new_v4()),
            sender_id,
            content,
            now,
        )?;

        let stored = self
            .deps
            .message_repository
            .append(event.message.clone())
            .await?;
        self.deps.room_repository.update(room.clone()).await?;

        let dto = MessageDto::from_message(&stored, sender.username.as_str());
        self.deps
            .notifier
            .message_received(room.id(), dto.clone())
            .await;

        Ok(dto)
    }

    /// 按时间向更早方向翻页，页内升序返回
    pub async fn get_history(
        &self,
        request: ChatHistoryRequest,
    ) -> Result<ChatHistoryDto, ApplicationError> {
        let user = UserId::from(request.user_id);
        let room = self.load_room(RoomId::from(request.room_id)).await?;

        if !room.is_participant(user) {
            return Err(DomainError::UserNotInRoom.into());
        }

        let limit = match request.page_size {
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            _ => DEFAULT_PAGE_SIZE,
        };

        // 多取一条探测是否还有更早的消息
        let mut messages = self
            .deps
            .message_repository
            .page_before(room.id(), request.before, limit + 1)
            .await?;
        let has_more = messages.len() as u32 > limit;
        messages.truncate(limit as usize);
        messages.reverse();

        let dtos = self.message_dtos(&messages).await?;

        Ok(ChatHistoryDto {
            messages: dtos,
            has_more,
        })
    }

    /// 参与者视角的房间详情
    pub async fn get_room(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<RoomDto, ApplicationError> {
        let user = UserId::from(user_id);
        let room = self.load_room(RoomId::from(room_id)).await?;

        if !room.is_participant(user) {
            return Err(DomainError::UserNotInRoom.into());
        }

        self.room_dto(&room).await
    }

    /// 房间参与者列表
    pub async fn room_users(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<Vec<UserDto>, ApplicationError> {
        let room_dto = self.get_room(user_id, room_id).await?;
        Ok(room_dto.participants)
    }

    /// 用户参与的全部房间，最近有消息的排前面
    pub async fn list_rooms(&self, user_id: Uuid) -> Result<Vec<RoomDto>, ApplicationError> {
        let user = UserId::from(user_id);
        let mut rooms = self.deps.room_repository.rooms_for_user(user).await?;
        rooms.sort_by_key(|room| {
            std::cmp::Reverse(room.last_message_at().unwrap_or_else(|| room.created_at()))
        });

        let user_map = self.participant_map(&rooms).await?;
        Ok(rooms
            .iter()
            .map(|room| Self::assemble_room_dto(room, &user_map))
            .collect())
    }

    /// 供 WebSocket 层校验用户是否在房间内
    pub async fn verify_membership(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<(), ApplicationError> {
        let room = self.load_room(RoomId::from(room_id)).await?;
        if !room.is_participant(UserId::from(user_id)) {
            return Err(DomainError::UserNotInRoom.into());
        }
        Ok(())
    }

    /// 用户参与的房间ID列表，用于连接建立时批量入组
    pub async fn room_ids_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RoomId>, ApplicationError> {
        let rooms = self
            .deps
            .room_repository
            .rooms_for_user(UserId::from(user_id))
            .await?;
        Ok(rooms.iter().map(|room| room.id()).collect())
    }

    async fn load_room(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    /// 用户当前的活跃连接全部订阅到房间组
    async fn subscribe_live_connections(&self, user_id: UserId, room_id: RoomId) {
        match self.deps.presence.connections(user_id).await {
            Ok(connections) => {
                for connection_id in connections {
                    self.deps.notifier.subscribe(connection_id, room_id).await;
                }
            }
            Err(err) => {
                tracing::warn!(
                    "failed to look up connections of {} for room {}: {}",
                    user_id,
                    room_id,
                    err
                );
            }
        }
    }

    async fn room_dto(&self, room: &ChatRoom) -> Result<RoomDto, ApplicationError> {
        let users = self
            .deps
            .user_repository
            .find_by_ids(room.participants())
            .await?;
        let user_map: HashMap<UserId, User> =
            users.into_iter().map(|user| (user.id, user)).collect();
        Ok(Self::assemble_room_dto(room, &user_map))
    }

    fn assemble_room_dto(room: &ChatRoom, users: &HashMap<UserId, User>) -> RoomDto {
        let participants = room
            .participants()
            .iter()
            .filter_map(|id| users.get(id).map(UserDto::from))
            .collect();

        RoomDto {
            id: Uuid::from(room.id()),
            name: room.name().as_str().to_owned(),
            is_private: room.is_private(),
            creator_id: Uuid::from(room.creator_id()),
            participants,
            created_at: room.created_at(),
            last_message_at: room.last_message_at(),
        }
    }

    async fn participant_map(
        &self,
        rooms: &[ChatRoom],
    ) -> Result<HashMap<UserId, User>, ApplicationError> {
        let mut ids: Vec<UserId> = rooms
            .iter()
            .flat_map(|room| room.participants().iter().copied())
            .collect();
        ids.sort();
        ids.dedup();

        let users = self.deps.user_repository.find_by_ids(&ids).await?;
        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }

    async fn message_dtos(
        &self,
        messages: &[domain::Message],
    ) -> Result<Vec<MessageDto>, ApplicationError> {
        let mut sender_ids: Vec<UserId> =
            messages.iter().map(|message| message.sender_id).collect();
        sender_ids.sort();
        sender_ids.dedup();

        let users = self.deps.user_repository.find_by_ids(&sender_ids).await?;
        let user_map: HashMap<UserId, User> =
            users.into_iter().map(|user| (user.id, user)).collect();

        Ok(messages
            .iter()
            .map(|message| {
                let username = user_map
                    .get(&message.sender_id)
                    .map(|user| user.username.as_str())
                    .unwrap_or("unknown");
                MessageDto::from_message(message, username)
            })
            .collect())
    }
}
