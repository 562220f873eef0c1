//! 用例服务集成测试
//!
//! 用内存仓储和进程内传输跑完整命令流程，验证私聊幂等、
//! 历史分页、未读计数和消息扇出的端到端行为。

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use application::{
    AddRoomMemberRequest, ApplicationError, AuthenticateUserRequest, ChatHistoryRequest,
    ChatNotifier, ChatService, ChatServiceDependencies, Clock, CreatePrivateChatRequest,
    CreatePublicRoomRequest, InMemoryPresenceTracker, JoinRoomRequest, PresenceTracker,
    RegisterUserRequest, SendMessageRequest, ServerEvent, UnreadService,
    UnreadServiceDependencies, UserService, UserServiceDependencies,
};
use domain::{ConnectionId, DomainError, MessageRepository, RoomId, Timestamp, User};
use infrastructure::{
    BcryptPasswordHasher, InMemoryChatRoomRepository, InMemoryMessageRepository,
    InMemoryReadReceiptRepository, InMemoryUserRepository, LocalGroupTransport,
};

/// 每次取值前进一毫秒的测试时钟，保证消息时间严格递增
struct SteppingClock {
    current: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    fn new() -> Self {
        Self {
            current: Mutex::new(Utc::now()),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        let mut guard = self.current.lock().unwrap();
        let now = *guard;
        *guard = now + Duration::milliseconds(1);
        now
    }
}

struct TestServices {
    transport: Arc<LocalGroupTransport>,
    presence: Arc<InMemoryPresenceTracker>,
    messages: Arc<InMemoryMessageRepository>,
    chat_service: ChatService,
    unread_service: UnreadService,
    user_service: UserService,
}

impl TestServices {
    fn new() -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let rooms = Arc::new(InMemoryChatRoomRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let receipts = Arc::new(InMemoryReadReceiptRepository::new());
        let transport = Arc::new(LocalGroupTransport::new());
        let presence = Arc::new(InMemoryPresenceTracker::new());
        let clock = Arc::new(SteppingClock::new());
        let notifier = Arc::new(ChatNotifier::new(transport.clone()));

        let chat_service = ChatService::new(ChatServiceDependencies {
            room_repository: rooms.clone(),
            message_repository: messages.clone(),
            user_repository: users.clone(),
            clock: clock.clone(),
            notifier: notifier.clone(),
            presence: presence.clone(),
        });
        let unread_service = UnreadService::new(UnreadServiceDependencies {
            room_repository: rooms.clone(),
            message_repository: messages.clone(),
            receipt_repository: receipts.clone(),
            clock: clock.clone(),
        });
        let user_service = UserService::new(UserServiceDependencies {
            user_repository: users.clone(),
            password_hasher: Arc::new(BcryptPasswordHasher::new(Some(4))),
            clock,
        });

        Self {
            transport,
            presence,
            messages,
            chat_service,
            unread_service,
            user_service,
        }
    }

    async fn register_user(&self, username: &str) -> User {
        self.user_service
            .register(RegisterUserRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: "secret-password".to_string(),
            })
            .await
            .expect("registration should succeed")
    }
}

#[tokio::test]
async fn test_private_chat_is_idempotent_across_orders() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;

    let first = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    // 反向发起拿到的是同一个房间
    let second = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: bob.id.0,
            other_user_id: alice.id.0,
        })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(first.is_private);
    assert_eq!(first.participants.len(), 2);
}

#[tokio::test]
async fn test_private_chat_with_self_is_rejected() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;

    let result = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: alice.id.0,
        })
        .await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::SelfChat))
    ));
}

#[tokio::test]
async fn test_send_message_validates_content() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let blank = services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: alice.id.0,
            room_id: room.id,
            content: "   ".to_string(),
        })
        .await;
    assert!(matches!(
        blank,
        Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
    ));

    let too_long = services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: alice.id.0,
            room_id: room.id,
            content: "a".repeat(1001),
        })
        .await;
    assert!(matches!(
        too_long,
        Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
    ));

    // 恰好到上限的消息可以发送，内容原样保留
    let at_limit = services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: alice.id.0,
            room_id: room.id,
            content: "b".repeat(1000),
        })
        .await
        .unwrap();
    assert_eq!(at_limit.content.chars().count(), 1000);
}

#[tokio::test]
async fn test_history_pages_backwards_without_overlap() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let mut sent = Vec::new();
    for i in 1..=5 {
        let dto = services
            .chat_service
            .send_message(SendMessageRequest {
                sender_id: alice.id.0,
                room_id: room.id,
                content: format!("message {i}"),
            })
            .await
            .unwrap();
        sent.push(dto);
    }

    // 第一页：最新两条，页内升序
    let page1 = services
        .chat_service
        .get_history(ChatHistoryRequest {
            user_id: bob.id.0,
            room_id: room.id,
            before: None,
            page_size: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(
        page1.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![sent[3].id, sent[4].id]
    );
    assert!(page1.has_more);

    // 第二页：游标取第一页最早一条的时间，严格更早，无重叠
    let page2 = services
        .chat_service
        .get_history(ChatHistoryRequest {
            user_id: bob.id.0,
            room_id: room.id,
            before: Some(page1.messages[0].sent_at),
            page_size: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(
        page2.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![sent[1].id, sent[2].id]
    );
    assert!(page2.has_more);

    let page3 = services
        .chat_service
        .get_history(ChatHistoryRequest {
            user_id: bob.id.0,
            room_id: room.id,
            before: Some(page2.messages[0].sent_at),
            page_size: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(
        page3.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![sent[0].id]
    );
    assert!(!page3.has_more);
}

#[tokio::test]
async fn test_recent_messages_come_newest_first() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let mut sent = Vec::new();
    for i in 1..=3 {
        let dto = services
            .chat_service
            .send_message(SendMessageRequest {
                sender_id: alice.id.0,
                room_id: room.id,
                content: format!("message {i}"),
            })
            .await
            .unwrap();
        sent.push(dto);
    }

    // 首屏取最新两条，降序
    let recent = services
        .messages
        .recent_n(RoomId::from(room.id), 2)
        .await
        .unwrap();
    assert_eq!(
        recent.iter().map(|m| m.id.0).collect::<Vec<_>>(),
        vec![sent[2].id, sent[1].id]
    );

    // 超过存量时取全部
    let all = services
        .messages
        .recent_n(RoomId::from(room.id), 10)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_history_requires_membership() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let outsider = services.register_user("mallory").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let result = services
        .chat_service
        .get_history(ChatHistoryRequest {
            user_id: outsider.id.0,
            room_id: room.id,
            before: None,
            page_size: None,
        })
        .await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::UserNotInRoom))
    ));
}

#[tokio::test]
async fn test_unread_counts_follow_read_receipts() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    for i in 1..=3 {
        services
            .chat_service
            .send_message(SendMessageRequest {
                sender_id: bob.id.0,
                room_id: room.id,
                content: format!("from bob {i}"),
            })
            .await
            .unwrap();
    }

    // 没有回执时，别人发的全部算未读
    let counts = services.unread_service.unread_counts(alice.id.0).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].room_id, room.id);
    assert_eq!(counts[0].unread_count, 3);

    // 自己发的消息不计入自己的未读
    let bob_counts = services.unread_service.unread_counts(bob.id.0).await.unwrap();
    assert_eq!(bob_counts[0].unread_count, 0);

    services
        .unread_service
        .mark_room_read(alice.id.0, room.id)
        .await
        .unwrap();
    let counts = services.unread_service.unread_counts(alice.id.0).await.unwrap();
    assert_eq!(counts[0].unread_count, 0);

    services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: bob.id.0,
            room_id: room.id,
            content: "after the mark".to_string(),
        })
        .await
        .unwrap();
    let counts = services.unread_service.unread_counts(alice.id.0).await.unwrap();
    assert_eq!(counts[0].unread_count, 1);
}

#[tokio::test]
async fn test_mark_read_requires_membership() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let outsider = services.register_user("mallory").await;
    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let result = services
        .unread_service
        .mark_room_read(outsider.id.0, room.id)
        .await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::UserNotInRoom))
    ));
}

#[tokio::test]
async fn test_message_fanout_reaches_subscribed_connections() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let charlie = services.register_user("charlie").await;

    // 三个用户各挂一条活跃连接
    let alice_conn = ConnectionId::new(Uuid::new_v4());
    let bob_conn = ConnectionId::new(Uuid::new_v4());
    let charlie_conn = ConnectionId::new(Uuid::new_v4());
    let mut alice_rx = services.transport.register_connection(alice_conn).await;
    let mut bob_rx = services.transport.register_connection(bob_conn).await;
    let mut charlie_rx = services.transport.register_connection(charlie_conn).await;
    services.presence.connect(alice.id, alice_conn).await.unwrap();
    services.presence.connect(bob.id, bob_conn).await.unwrap();
    services.presence.connect(charlie.id, charlie_conn).await.unwrap();

    let room = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();

    let dto = services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: bob.id.0,
            room_id: room.id,
            content: "hello alice".to_string(),
        })
        .await
        .unwrap();

    // 发送者自己的连接同样收到回显
    match alice_rx.try_recv().unwrap() {
        ServerEvent::ReceiveMessage { message } => assert_eq!(message.id, dto.id),
        other => panic!("unexpected event: {other:?}"),
    }
    match bob_rx.try_recv().unwrap() {
        ServerEvent::ReceiveMessage { message } => {
            assert_eq!(message.sender_username, "bob");
            assert_eq!(message.content, "hello alice");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    // 房间外的连接收不到
    assert!(charlie_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_add_member_requires_admin_and_public_room() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let charlie = services.register_user("charlie").await;

    let room = services
        .chat_service
        .create_public_room(CreatePublicRoomRequest {
            creator_id: alice.id.0,
            name: "general".to_string(),
        })
        .await
        .unwrap();

    // 非管理员拉人被拒
    let denied = services
        .chat_service
        .add_room_member(AddRoomMemberRequest {
            actor_id: bob.id.0,
            room_id: room.id,
            user_id: charlie.id.0,
        })
        .await;
    assert!(matches!(
        denied,
        Err(ApplicationError::Domain(
            DomainError::InsufficientPermissions
        ))
    ));

    services
        .chat_service
        .add_room_member(AddRoomMemberRequest {
            actor_id: alice.id.0,
            room_id: room.id,
            user_id: bob.id.0,
        })
        .await
        .unwrap();

    // 重复拉同一个人报已在房间
    let duplicate = services
        .chat_service
        .add_room_member(AddRoomMemberRequest {
            actor_id: alice.id.0,
            room_id: room.id,
            user_id: bob.id.0,
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(ApplicationError::Domain(DomainError::UserAlreadyInRoom))
    ));

    // 私聊房间不能拉第三人
    let private = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();
    let into_private = services
        .chat_service
        .add_room_member(AddRoomMemberRequest {
            actor_id: alice.id.0,
            room_id: private.id,
            user_id: charlie.id.0,
        })
        .await;
    assert!(matches!(
        into_private,
        Err(ApplicationError::Domain(DomainError::RoomIsPrivate))
    ));
}

#[tokio::test]
async fn test_join_room_is_idempotent_and_respects_privacy() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;
    let charlie = services.register_user("charlie").await;

    let public = services
        .chat_service
        .create_public_room(CreatePublicRoomRequest {
            creator_id: alice.id.0,
            name: "lounge".to_string(),
        })
        .await
        .unwrap();

    services
        .chat_service
        .join_room(JoinRoomRequest {
            user_id: bob.id.0,
            room_id: public.id,
        })
        .await
        .unwrap();
    // 重复加入是无害的
    services
        .chat_service
        .join_room(JoinRoomRequest {
            user_id: bob.id.0,
            room_id: public.id,
        })
        .await
        .unwrap();

    let users = services
        .chat_service
        .room_users(alice.id.0, public.id)
        .await
        .unwrap();
    assert_eq!(users.len(), 2);

    let private = services
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: alice.id.0,
            other_user_id: bob.id.0,
        })
        .await
        .unwrap();
    let denied = services
        .chat_service
        .join_room(JoinRoomRequest {
            user_id: charlie.id.0,
            room_id: private.id,
        })
        .await;
    assert!(matches!(
        denied,
        Err(ApplicationError::Domain(DomainError::RoomIsPrivate))
    ));
}

#[tokio::test]
async fn test_rooms_order_by_latest_activity() {
    let services = TestServices::new();
    let alice = services.register_user("alice").await;
    let bob = services.register_user("bob").await;

    let first = services
        .chat_service
        .create_public_room(CreatePublicRoomRequest {
            creator_id: alice.id.0,
            name: "older room".to_string(),
        })
        .await
        .unwrap();
    let second = services
        .chat_service
        .create_public_room(CreatePublicRoomRequest {
            creator_id: alice.id.0,
            name: "newer room".to_string(),
        })
        .await
        .unwrap();

    let listed = services.chat_service.list_rooms(alice.id.0).await.unwrap();
    assert_eq!(listed[0].id, second.id);

    // 旧房间来了新消息后排到最前
    services
        .chat_service
        .join_room(JoinRoomRequest {
            user_id: bob.id.0,
            room_id: first.id,
        })
        .await
        .unwrap();
    services
        .chat_service
        .send_message(SendMessageRequest {
            sender_id: bob.id.0,
            room_id: first.id,
            content: "bump".to_string(),
        })
        .await
        .unwrap();

    let listed = services.chat_service.list_rooms(alice.id.0).await.unwrap();
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);
}

#[tokio::test]
async fn test_registration_and_login_flow() {
    let services = TestServices::new();
    services.register_user("alice").await;

    // 邮箱冲突
    let duplicate = services
        .user_service
        .register(RegisterUserRequest {
            username: "alice2".to_string(),
            email: "alice@example.com".to_string(),
            password: "another-password".to_string(),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(ApplicationError::Domain(DomainError::UserAlreadyExists))
    ));

    let authenticated = services
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: "alice@example.com".to_string(),
            password: "secret-password".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(authenticated.username.as_str(), "alice");

    let wrong_password = services
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: "alice@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await;
    assert!(matches!(
        wrong_password,
        Err(ApplicationError::Authentication)
    ));

    let unknown_email = services
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: "nobody@example.com".to_string(),
            password: "secret-password".to_string(),
        })
        .await;
    assert!(matches!(
        unknown_email,
        Err(ApplicationError::Authentication)
    ));
}

#[tokio::test]
async fn test_user_search_excludes_requester() {
    let services = TestServices::new();
    let alice = services.register_user("annabel").await;
    services.register_user("anna").await;
    services.register_user("bob").await;

    let found = services
        .user_service
        .search_users("ann", alice.id.0)
        .await
        .unwrap();
    let names: Vec<&str> = found.iter().map(|user| user.username.as_str()).collect();
    assert_eq!(names, vec!["anna"]);

    // 空白关键字直接返回空
    let blank = services
        .user_service
        .search_users("   ", alice.id.0)
        .await
        .unwrap();
    assert!(blank.is_empty());
}
