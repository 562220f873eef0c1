//! WebSocket 连接处理
//!
//! 升级前用 `?token=` 完成鉴权，连接建立后把该连接注册进传输层、
//! 登记在线状态并订阅用户已加入的全部房间组。单个 select 循环
//! 同时消费服务端事件和客户端帧，连接断开时统一清理。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use application::{PresenceChange, ServerEvent};
use domain::{ConnectionId, RoomId, UserId};

use crate::{error::ApiError, state::AppState};

type WsSender = SplitSink<WebSocket, WsMessage>;

/// 客户端指令，`type` 字段为指令名
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientCommand {
    JoinRoom { room_id: Uuid },
    LeaveRoom { room_id: Uuid },
    Typing { room_id: Uuid },
    GetOnlineUsers,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// 鉴权在升级前完成，token 无效直接返回 401 而不是升级后再断开
pub async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let claims = state.jwt_service.verify_token(&query.token)?;
    let user = state.user_service.get_user(claims.user_id).await?;
    let username = user.username.as_str().to_owned();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims.user_id, username)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, username: String) {
    let connection_id = ConnectionId::from(Uuid::new_v4());
    let mut events = state.transport.register_connection(connection_id).await;

    match state
        .presence
        .connect(UserId::from(user_id), connection_id)
        .await
    {
        Ok(PresenceChange::CameOnline) => {
            state
                .notifier
                .user_online(UserId::from(user_id), &username, connection_id)
                .await;
        }
        Ok(_) => {}
        Err(err) => warn!("failed to record connection of user {}: {}", user_id, err),
    }

    // 已加入房间的事件从连接建立起就能收到，无需客户端逐个 JoinRoom
    match state.chat_service.room_ids_for_user(user_id).await {
        Ok(room_ids) => {
            for room_id in room_ids {
                state.notifier.subscribe(connection_id, room_id).await;
            }
        }
        Err(err) => warn!("failed to load rooms of user {}: {}", user_id, err),
    }

    info!("User {} opened connection {}", username, connection_id);

    let (mut sender, mut incoming) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!("failed to serialize websocket payload: {}", err);
                        continue;
                    }
                };
                if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            message = incoming.next() => {
                let Some(Ok(message)) = message else { break };
                let handled = handle_incoming(
                    &state,
                    user_id,
                    &username,
                    connection_id,
                    message,
                    &mut sender,
                )
                .await;
                if handled.is_err() {
                    break;
                }
            }
        }
    }

    state.transport.unregister_connection(connection_id).await;
    match state
        .presence
        .disconnect(UserId::from(user_id), connection_id)
        .await
    {
        Ok(PresenceChange::WentOffline) => {
            state
                .notifier
                .user_offline(UserId::from(user_id), &username, connection_id)
                .await;
        }
        Ok(_) => {}
        Err(err) => warn!("failed to drop connection of user {}: {}", user_id, err),
    }

    info!("User {} closed connection {}", username, connection_id);
}

/// 处理一帧客户端输入，返回 Err 表示连接应当关闭
async fn handle_incoming(
    state: &AppState,
    user_id: Uuid,
    username: &str,
    connection_id: ConnectionId,
    message: WsMessage,
    sender: &mut WsSender,
) -> Result<(), ()> {
    match message {
        WsMessage::Close(_) => return Err(()),
        WsMessage::Ping(data) => {
            if sender.send(WsMessage::Pong(data)).await.is_err() {
                return Err(());
            }
        }
        WsMessage::Pong(_) => {}
        WsMessage::Binary(_) => {
            debug!("Ignoring binary frame on connection {}", connection_id);
        }
        WsMessage::Text(text) => {
            // 无法解析的帧只记日志，不因此断开连接
            let command = match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => command,
                Err(err) => {
                    debug!(
                        "Ignoring malformed frame on connection {}: {}",
                        connection_id, err
                    );
                    return Ok(());
                }
            };
            handle_command(state, user_id, username, connection_id, command, sender).await?;
        }
    }
    Ok(())
}

async fn handle_command(
    state: &AppState,
    user_id: Uuid,
    username: &str,
    connection_id: ConnectionId,
    command: ClientCommand,
    sender: &mut WsSender,
) -> Result<(), ()> {
    match command {
        ClientCommand::JoinRoom { room_id } => {
            if let Err(err) = state.chat_service.verify_membership(user_id, room_id).await {
                warn!(
                    "Connection {} denied subscription to room {}: {}",
                    connection_id, room_id, err
                );
                return Ok(());
            }
            state
                .notifier
                .subscribe(connection_id, RoomId::from(room_id))
                .await;
            info!("Connection {} joined room {}", connection_id, room_id);
        }
        ClientCommand::LeaveRoom { room_id } => {
            state
                .notifier
                .unsubscribe(connection_id, RoomId::from(room_id))
                .await;
            info!("Connection {} left room {}", connection_id, room_id);
        }
        ClientCommand::Typing { room_id } => {
            if state
                .chat_service
                .verify_membership(user_id, room_id)
                .await
                .is_err()
            {
                return Ok(());
            }
            state
                .notifier
                .user_typing(RoomId::from(room_id), username, connection_id)
                .await;
        }
        ClientCommand::GetOnlineUsers => {
            let user_ids: Vec<Uuid> = match state.presence.snapshot().await {
                Ok(ids) => ids.into_iter().map(Uuid::from).collect(),
                Err(err) => {
                    warn!("failed to read presence snapshot: {}", err);
                    return Ok(());
                }
            };
            let event = ServerEvent::OnlineUsers { user_ids };
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to serialize websocket payload: {}", err);
                    return Ok(());
                }
            };
            // 快照只回给请求方连接，不走群组广播
            if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                return Err(());
            }
        }
    }
    Ok(())
}
