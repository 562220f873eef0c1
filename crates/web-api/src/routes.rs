use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    AddRoomMemberRequest, AuthenticateUserRequest, ChatHistoryDto, ChatHistoryRequest,
    CreatePrivateChatRequest, CreatePublicRoomRequest, JoinRoomRequest, MessageDto,
    RegisterUserRequest, RoomDto, RoomUnreadDto, SendMessageRequest, UserDto,
};
use domain::Timestamp;

use crate::{auth::LoginResponse, error::ApiError, state::AppState, ws};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PrivateChatPayload {
    other_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct PublicRoomPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AddMemberPayload {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<Timestamp>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    term: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes())
        .route("/ws", get(ws::websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/chat/rooms", get(list_rooms))
        .route("/chat/rooms/private", post(create_private_chat))
        .route("/chat/rooms/public", post(create_public_room))
        .route("/chat/rooms/{room_id}", get(get_room))
        .route("/chat/rooms/{room_id}/join", post(join_room))
        .route(
            "/chat/rooms/{room_id}/users",
            get(room_users).post(add_room_member),
        )
        .route("/chat/rooms/{room_id}/messages", post(send_message))
        .route("/chat/rooms/{room_id}/history", get(get_history))
        .route("/chat/rooms/{room_id}/read", post(mark_room_read))
        .route("/chat/unread", get(unread_counts))
        .route("/chat/users/search", get(search_users))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(user.id.0)?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            user: UserDto::from(&user),
            token,
        }),
    ))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let token = state.jwt_service.generate_token(user.id.0)?;
    Ok(Json(LoginResponse {
        user: UserDto::from(&user),
        token,
    }))
}

async fn create_private_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PrivateChatPayload>,
) -> Result<Json<RoomDto>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let dto = state
        .chat_service
        .create_private_chat(CreatePrivateChatRequest {
            creator_id: user_id,
            other_user_id: payload.other_user_id,
        })
        .await?;

    Ok(Json(dto))
}

async fn create_public_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PublicRoomPayload>,
) -> Result<(StatusCode, Json<RoomDto>), ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let dto = state
        .chat_service
        .create_public_room(CreatePublicRoomRequest {
            creator_id: user_id,
            name: payload.name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomDto>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let dto = state.chat_service.get_room(user_id, room_id).await?;
    Ok(Json(dto))
}

async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let rooms = state.chat_service.list_rooms(user_id).await?;
    Ok(Json(rooms))
}

async fn join_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    state
        .chat_service
        .join_room(JoinRoomRequest { user_id, room_id })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn room_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let users = state.chat_service.room_users(user_id, room_id).await?;
    Ok(Json(users))
}

async fn add_room_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<AddMemberPayload>,
) -> Result<StatusCode, ApiError> {
    let actor_id = state.jwt_service.extract_user_from_headers(&headers)?;
    state
        .chat_service
        .add_room_member(AddRoomMemberRequest {
            actor_id,
            room_id,
            user_id: payload.user_id,
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let sender_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let dto = state
        .chat_service
        .send_message(SendMessageRequest {
            sender_id,
            room_id,
            content: payload.content,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ChatHistoryDto>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let history = state
        .chat_service
        .get_history(ChatHistoryRequest {
            user_id,
            room_id,
            before: query.before,
            page_size: query.page_size,
        })
        .await?;

    Ok(Json(history))
}

async fn mark_room_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    state
        .unread_service
        .mark_room_read(user_id, room_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn unread_counts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomUnreadDto>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let counts = state.unread_service.unread_counts(user_id).await?;
    Ok(Json(counts))
}

async fn search_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let users = state
        .user_service
        .search_users(&query.term, user_id)
        .await?;
    Ok(Json(users))
}
