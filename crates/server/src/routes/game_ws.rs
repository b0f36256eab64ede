//! Match WebSocket: seats and spectators of a live match, or a read-only
//! replay of an archived one.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query},
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::send_json;
use crate::archive::ArchivedMatch;
use crate::error::AppError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{MatchHandle, Registry};

#[derive(Deserialize)]
pub struct SocketQuery {
    /// Seat token; spectators omit it
    pub token: Option<String>,
}

/// GET /ws/matches/{match_id}
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(match_id): Path<String>,
    Query(q): Query<SocketQuery>,
    Extension(registry): Extension<Registry>,
) -> Result<Response, AppError> {
    if let Some(handle) = registry.get(&match_id).await {
        return Ok(ws.on_upgrade(move |socket| live_socket(socket, registry, handle, q.token)));
    }
    match registry.archive().get(&match_id).await? {
        Some(record) => Ok(ws.on_upgrade(move |socket| replay_socket(socket, record))),
        None => Err(AppError::NotFound("Match not found".to_string())),
    }
}

async fn live_socket(socket: WebSocket, registry: Registry, handle: MatchHandle, token: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let socket_id = registry.next_socket_id();
    let mut events = handle.subscribe();

    let participant = match handle.connect(socket_id, token).await {
        Ok(p) => p,
        Err(e) => {
            let _ = send_json(&mut sender, &ServerMessage::error(e.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!(match_id = %handle.id(), socket_id, seat = ?participant.seat.map(|s| s.number()), "Socket connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(out) => {
                    if out.is_for(socket_id) && send_json(&mut sender, &out.message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(match_id = %handle.id(), socket_id, skipped, "Socket lagged, resending state");
                    let view = handle.view();
                    let resync = [
                        ServerMessage::State { state: view.state },
                        ServerMessage::MatchStatus { snapshot: view.snapshot },
                    ];
                    for message in &resync {
                        if send_json(&mut sender, message).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(t))) => t,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => {
                        debug!(match_id = %handle.id(), socket_id, ?message, "Inbound");
                        if handle.send(participant, message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let error = ServerMessage::error(format!("Invalid message: {e}"));
                        if send_json(&mut sender, &error).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    handle.disconnect(participant).await;
    info!(match_id = %handle.id(), socket_id, "Socket disconnected");
}

async fn replay_socket(socket: WebSocket, record: ArchivedMatch) {
    let (mut sender, mut receiver) = socket.split();
    let opening = [
        ServerMessage::State { state: record.state },
        ServerMessage::MatchStatus { snapshot: record.snapshot },
    ];
    for message in &opening {
        if send_json(&mut sender, message).await.is_err() {
            return;
        }
    }

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(_) => {
                let error = ServerMessage::error("Replays are read-only");
                if send_json(&mut sender, &error).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    debug!(match_id = %record.match_id, "Replay socket closed");
}
