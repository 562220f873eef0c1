//! 聊天室聚合根
//!
//! 参与者列表对外只读，所有变更都必须经过命名的领域操作；
//! 追加消息会产生 [`MessageAppended`] 领域事件，由调用方负责
//! 先持久化、再广播。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::events::MessageAppended;
use crate::message::Message;
use crate::value_objects::{MessageContent, MessageId, RoomId, RoomName, Timestamp, UserId};

/// 聊天室可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRoomVisibility {
    /// 公开房间，任何人可自助加入
    Public,
    /// 私聊房间，固定两名参与者
    Private,
}

/// 聊天室聚合根
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    id: RoomId,
    name: RoomName,
    visibility: ChatRoomVisibility,
    creator_id: UserId,
    participants: Vec<UserId>,
    created_at: Timestamp,
    last_message_at: Option<Timestamp>,
}

impl ChatRoom {
    /// 创建私聊房间，参与者固定为规范顺序的一对用户。
    ///
    /// 同一对用户无论参数顺序如何都会得到相同的参与者排列，
    /// 配套的仓储以该规范对作为唯一键实现幂等创建。
    pub fn create_private(
        id: RoomId,
        creator: UserId,
        other: UserId,
        now: Timestamp,
    ) -> DomainResult<Self> {
        if creator == other {
            return Err(DomainError::SelfChat);
        }

        let (first, second) = Self::private_pair(creator, other);
        let name = RoomName::parse(format!("private_{}_{}", first, second))?;

        Ok(Self {
            id,
            name,
            visibility: ChatRoomVisibility::Private,
            creator_id: creator,
            participants: vec![first, second],
            created_at: now,
            last_message_at: None,
        })
    }

    /// 创建公开房间，创建者自动成为首位参与者和管理员。
    pub fn create_public(id: RoomId, name: RoomName, creator: UserId, now: Timestamp) -> Self {
        Self {
            id,
            name,
            visibility: ChatRoomVisibility::Public,
            creator_id: creator,
            participants: vec![creator],
            created_at: now,
            last_message_at: None,
        }
    }

    /// 从存储记录还原聚合（用于仓储加载）。
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: RoomId,
        name: RoomName,
        visibility: ChatRoomVisibility,
        creator_id: UserId,
        participants: Vec<UserId>,
        created_at: Timestamp,
        last_message_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            name,
            visibility,
            creator_id,
            participants,
            created_at,
            last_message_at,
        }
    }

    /// 一对用户的规范顺序，作为私聊房间的身份键。
    pub fn private_pair(a: UserId, b: UserId) -> (UserId, UserId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// 添加参与者。已在房间内时静默返回；私聊房间满员时拒绝。
    pub fn add_participant(&mut self, user_id: UserId) -> DomainResult<()> {
        if self.participants.contains(&user_id) {
            return Ok(());
        }

        if self.visibility == ChatRoomVisibility::Private && self.participants.len() >= 2 {
            return Err(DomainError::PrivateChatFull);
        }

        self.participants.push(user_id);
        Ok(())
    }

    /// 追加一条消息并返回领域事件。
    ///
    /// 发送者必须是参与者。消息时间取服务器时钟，但不会早于
    /// 本房间上一条消息，保证同一房间内时间戳单调不减。
    pub fn append_message(
        &mut self,
        message_id: MessageId,
        sender_id: UserId,
        content: MessageContent,
        now: Timestamp,
    ) -> DomainResult<MessageAppended> {
        if !self.is_participant(sender_id) {
            return Err(DomainError::UserNotInRoom);
        }

        let sent_at = match self.last_message_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };

        let message = Message::new(message_id, self.id, sender_id, content, sent_at);
        self.last_message_at = Some(sent_at);

        Ok(MessageAppended::new(message))
    }

    /// 用户是否为参与者
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// 用户是否为管理员（即创建者）
    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn visibility(&self) -> ChatRoomVisibility {
        self.visibility
    }

    pub fn is_private(&self) -> bool {
        self.visibility == ChatRoomVisibility::Private
    }

    pub fn creator_id(&self) -> UserId {
        self.creator_id
    }

    /// 参与者只读视图
    pub fn participants(&self) -> &[UserId] {
        &self.participants
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_message_at(&self) -> Option<Timestamp> {
        self.last_message_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn room_id() -> RoomId {
        RoomId::from(Uuid::new_v4())
    }

    #[test]
    fn private_chat_holds_exactly_two_participants() {
        let (a, b) = (user(), user());
        let room = ChatRoom::create_private(room_id(), a, b, Utc::now()).unwrap();

        assert_eq!(room.participants().len(), 2);
        assert!(room.is_participant(a));
        assert!(room.is_participant(b));
        assert!(room.is_private());
    }

    #[test]
    fn private_chat_with_self_is_rejected() {
        let a = user();
        let result = ChatRoom::create_private(room_id(), a, a, Utc::now());
        assert_eq!(result.unwrap_err(), DomainError::SelfChat);
    }

    #[test]
    fn private_pair_is_order_independent() {
        let (a, b) = (user(), user());
        assert_eq!(ChatRoom::private_pair(a, b), ChatRoom::private_pair(b, a));
    }

    #[test]
    fn private_chat_rejects_third_participant() {
        let (a, b) = (user(), user());
        let mut room = ChatRoom::create_private(room_id(), a, b, Utc::now()).unwrap();

        let result = room.add_participant(user());
        assert_eq!(result.unwrap_err(), DomainError::PrivateChatFull);
        assert_eq!(room.participants().len(), 2);
    }

    #[test]
    fn re_adding_existing_participant_is_a_noop() {
        let (a, b) = (user(), user());
        let mut room = ChatRoom::create_private(room_id(), a, b, Utc::now()).unwrap();

        // 已满的私聊里重复加入已有成员也不报错
        assert!(room.add_participant(a).is_ok());
        assert_eq!(room.participants().len(), 2);
    }

    #[test]
    fn public_room_accepts_many_participants() {
        let creator = user();
        let name = RoomName::parse("General").unwrap();
        let mut room = ChatRoom::create_public(room_id(), name, creator, Utc::now());

        assert!(room.is_admin(creator));
        for _ in 0..10 {
            room.add_participant(user()).unwrap();
        }
        assert_eq!(room.participants().len(), 11);
    }

    #[test]
    fn append_message_requires_membership() {
        let creator = user();
        let name = RoomName::parse("General").unwrap();
        let mut room = ChatRoom::create_public(room_id(), name, creator, Utc::now());

        let content = MessageContent::new("hello").unwrap();
        let result =
            room.append_message(MessageId::from(Uuid::new_v4()), user(), content, Utc::now());
        assert_eq!(result.unwrap_err(), DomainError::UserNotInRoom);
    }

    #[test]
    fn append_message_emits_event_and_tracks_latest_timestamp() {
        let creator = user();
        let name = RoomName::parse("General").unwrap();
        let mut room = ChatRoom::create_public(room_id(), name, creator, Utc::now());

        let now = Utc::now();
        let content = MessageContent::new("hello").unwrap();
        let event = room
            .append_message(MessageId::from(Uuid::new_v4()), creator, content, now)
            .unwrap();

        assert_eq!(event.message.room_id, room.id());
        assert_eq!(event.message.sender_id, creator);
        assert_eq!(room.last_message_at(), Some(now));
    }

    #[test]
    fn append_message_never_goes_back_in_time() {
        let creator = user();
        let name = RoomName::parse("General").unwrap();
        let mut room = ChatRoom::create_public(room_id(), name, creator, Utc::now());

        let later = Utc::now();
        let earlier = later - Duration::seconds(30);

        let content = MessageContent::new("first").unwrap();
        room.append_message(MessageId::from(Uuid::new_v4()), creator, content, later)
            .unwrap();

        // 时钟回拨时沿用上一条消息的时间戳
        let content = MessageContent::new("second").unwrap();
        let event = room
            .append_message(MessageId::from(Uuid::new_v4()), creator, content, earlier)
            .unwrap();
        assert_eq!(event.message.created_at, later);
    }
}
