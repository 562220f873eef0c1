//! Postgres 仓储实现
//!
//! 行记录通过 `FromRow` 读取，再 `TryFrom` 还原为领域对象。
//! 房间与参与者拆两张表，写入时在事务内同步参与者表；
//! 私聊房间靠规范用户对上的部分唯一索引保证并发创建只留一个。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use domain::{
    ChatRoom, ChatRoomRepository, ChatRoomVisibility, Message, MessageContent, MessageId,
    MessageRepository, ReadReceipt, ReadReceiptRepository, RepositoryError, RoomId, RoomName,
    Timestamp, User, UserEmail, UserId, UserRepository,
};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn map_insert_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => map_sqlx_err(err),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username =
            domain::Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let email =
            domain::UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let password = domain::PasswordHash::new(value.password_hash)
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            username,
            email,
            password,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    is_private: bool,
    creator_id: Uuid,
    created_at: DateTime<Utc>,
    last_message_at: Option<DateTime<Utc>>,
}

impl RoomRecord {
    fn into_room(self, participants: Vec<UserId>) -> Result<ChatRoom, RepositoryError> {
        let name =
            RoomName::parse(self.name).map_err(|err| invalid_data(err.to_string()))?;
        let visibility = if self.is_private {
            ChatRoomVisibility::Private
        } else {
            ChatRoomVisibility::Public
        };

        Ok(ChatRoom::restore(
            RoomId::from(self.id),
            name,
            visibility,
            UserId::from(self.creator_id),
            participants,
            self.created_at,
            self.last_message_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message::new(
            MessageId::from(value.id),
            RoomId::from(value.room_id),
            UserId::from(value.sender_id),
            content,
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct ReceiptRecord {
    user_id: Uuid,
    room_id: Uuid,
    last_read_at: DateTime<Utc>,
}

impl From<ReceiptRecord> for ReadReceipt {
    fn from(value: ReceiptRecord) -> Self {
        ReadReceipt::new(
            UserId::from(value.user_id),
            RoomId::from(value.room_id),
            value.last_read_at,
        )
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.username.as_str())
        .bind(user.email.as_str())
        .bind(user.password.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_err)?;

        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, email, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let raw: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let records = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, email, password_hash, created_at FROM users WHERE id = ANY($1)"#,
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }

    async fn find_by_email(&self, email: UserEmail) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"SELECT id, username, email, password_hash, created_at FROM users WHERE email = $1"#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn search_by_username(
        &self,
        term: &str,
        exclude: UserId,
        limit: u32,
    ) -> Result<Vec<User>, RepositoryError> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username ILIKE '%' || $1 || '%' AND id <> $2
            ORDER BY username
            LIMIT $3
            "#,
        )
        .bind(term)
        .bind(Uuid::from(exclude))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(User::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_participants(&self, room_id: Uuid) -> Result<Vec<UserId>, RepositoryError> {
        let raw: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT user_id FROM room_participants WHERE room_id = $1 ORDER BY joined_at, user_id"#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(raw.into_iter().map(UserId::from).collect())
    }

    /// 批量取多个房间的参与者，避免逐房间查询
    async fn load_participants_for(
        &self,
        room_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, UserId)>, RepositoryError> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT room_id, user_id FROM room_participants
            WHERE room_id = ANY($1)
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|(room_id, user_id)| (room_id, UserId::from(user_id)))
            .collect())
    }

    fn compose_rooms(
        records: Vec<RoomRecord>,
        participant_rows: Vec<(Uuid, UserId)>,
    ) -> Result<Vec<ChatRoom>, RepositoryError> {
        let mut grouped: std::collections::HashMap<Uuid, Vec<UserId>> =
            std::collections::HashMap::new();
        for (room_id, user_id) in participant_rows {
            grouped.entry(room_id).or_default().push(user_id);
        }

        records
            .into_iter()
            .map(|record| {
                let participants = grouped.remove(&record.id).unwrap_or_default();
                record.into_room(participants)
            })
            .collect()
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let pair = private_pair_columns(&room);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            INSERT INTO chat_rooms (id, name, is_private, creator_id, private_pair_low, private_pair_high, created_at, last_message_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(room.id()))
        .bind(room.name().as_str())
        .bind(room.is_private())
        .bind(Uuid::from(room.creator_id()))
        .bind(pair.0)
        .bind(pair.1)
        .bind(room.created_at())
        .bind(room.last_message_at())
        .execute(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        insert_participants(&mut tx, room.id(), room.participants(), room.created_at()).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(room)
    }

    async fn create_private_if_absent(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let pair = private_pair_columns(&room);
        if pair.0.is_none() {
            return Err(invalid_data("private room must hold a pair"));
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO chat_rooms (id, name, is_private, creator_id, private_pair_low, private_pair_high, created_at, last_message_at)
            VALUES ($1, $2, TRUE, $3, $4, $5, $6, NULL)
            ON CONFLICT (private_pair_low, private_pair_high) WHERE is_private DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::from(room.id()))
        .bind(room.name().as_str())
        .bind(Uuid::from(room.creator_id()))
        .bind(pair.0)
        .bind(pair.1)
        .bind(room.created_at())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        match inserted {
            Some(_) => {
                insert_participants(&mut tx, room.id(), room.participants(), room.created_at())
                    .await?;
                tx.commit().await.map_err(map_sqlx_err)?;
                Ok(room)
            }
            None => {
                // 同一对用户的房间已存在，返回现存的那个
                tx.rollback().await.map_err(map_sqlx_err)?;
                let (low, high) = (pair.0.map(UserId::from), pair.1.map(UserId::from));
                match (low, high) {
                    (Some(a), Some(b)) => self
                        .find_private_by_pair(a, b)
                        .await?
                        .ok_or(RepositoryError::NotFound),
                    _ => Err(RepositoryError::NotFound),
                }
            }
        }
    }

    async fn update(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let updated = sqlx::query(
            r#"
            UPDATE chat_rooms
            SET name = $2, last_message_at = $3
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(room.id()))
        .bind(room.name().as_str())
        .bind(room.last_message_at())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let kept: Vec<Uuid> = room
            .participants()
            .iter()
            .map(|user_id| Uuid::from(*user_id))
            .collect();
        sqlx::query(r#"DELETE FROM room_participants WHERE room_id = $1 AND user_id <> ALL($2)"#)
            .bind(Uuid::from(room.id()))
            .bind(&kept)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        insert_participants(&mut tx, room.id(), room.participants(), Utc::now()).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<ChatRoom>, RepositoryError> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name, is_private, creator_id, created_at, last_message_at
            FROM chat_rooms WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => {
                let participants = self.load_participants(record.id).await?;
                Ok(Some(record.into_room(participants)?))
            }
            None => Ok(None),
        }
    }

    async fn find_private_by_pair(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let (low, high) = ChatRoom::private_pair(a, b);
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name, is_private, creator_id, created_at, last_message_at
            FROM chat_rooms
            WHERE is_private AND private_pair_low = $1 AND private_pair_high = $2
            "#,
        )
        .bind(Uuid::from(low))
        .bind(Uuid::from(high))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => {
                let participants = self.load_participants(record.id).await?;
                Ok(Some(record.into_room(participants)?))
            }
            None => Ok(None),
        }
    }

    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT r.id, r.name, r.is_private, r.creator_id, r.created_at, r.last_message_at
            FROM chat_rooms r
            JOIN room_participants p ON p.room_id = r.id
            WHERE p.user_id = $1
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let room_ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let participant_rows = self.load_participants_for(&room_ids).await?;
        Self::compose_rooms(records, participant_rows)
    }
}

fn private_pair_columns(room: &ChatRoom) -> (Option<Uuid>, Option<Uuid>) {
    if !room.is_private() {
        return (None, None);
    }
    match room.participants() {
        [a, b] => {
            let (low, high) = ChatRoom::private_pair(*a, *b);
            (Some(Uuid::from(low)), Some(Uuid::from(high)))
        }
        _ => (None, None),
    }
}

async fn insert_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    room_id: RoomId,
    participants: &[UserId],
    joined_at: Timestamp,
) -> Result<(), RepositoryError> {
    let raw: Vec<Uuid> = participants.iter().map(|id| Uuid::from(*id)).collect();
    sqlx::query(
        r#"
        INSERT INTO room_participants (room_id, user_id, joined_at)
        SELECT $1, member, $3 FROM UNNEST($2::uuid[]) AS member
        ON CONFLICT (room_id, user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::from(room_id))
    .bind(&raw)
    .bind(joined_at)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_err)?;
    Ok(())
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, room_id, sender_id, content, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_err)?;

        Message::try_from(record)
    }

    async fn page_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, room_id, sender_id, content, created_at
            FROM messages
            WHERE room_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn count_since(
        &self,
        room_id: RoomId,
        exclude_sender: UserId,
        after: Option<Timestamp>,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE room_id = $1 AND sender_id <> $2
              AND ($3::timestamptz IS NULL OR created_at > $3)
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(Uuid::from(exclude_sender))
        .bind(after)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count as u64)
    }
}

#[derive(Clone)]
pub struct PgReadReceiptRepository {
    pool: PgPool,
}

impl PgReadReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadReceiptRepository for PgReadReceiptRepository {
    async fn upsert(&self, receipt: ReadReceipt) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO read_receipts (user_id, room_id, last_read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, room_id) DO UPDATE SET last_read_at = EXCLUDED.last_read_at
            "#,
        )
        .bind(Uuid::from(receipt.user_id))
        .bind(Uuid::from(receipt.room_id))
        .bind(receipt.last_read_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find(
        &self,
        user_id: UserId,
        room_id: RoomId,
    ) -> Result<Option<ReadReceipt>, RepositoryError> {
        let record = sqlx::query_as::<_, ReceiptRecord>(
            r#"SELECT user_id, room_id, last_read_at FROM read_receipts WHERE user_id = $1 AND room_id = $2"#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(room_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(ReadReceipt::from))
    }

    async fn find_for_user(&self, user_id: UserId) -> Result<Vec<ReadReceipt>, RepositoryError> {
        let records = sqlx::query_as::<_, ReceiptRecord>(
            r#"SELECT user_id, room_id, last_read_at FROM read_receipts WHERE user_id = $1"#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(ReadReceipt::from).collect())
    }
}

/// 一组共享同一连接池的 Postgres 仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub receipt_repository: Arc<PgReadReceiptRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            receipt_repository: Arc::new(PgReadReceiptRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
