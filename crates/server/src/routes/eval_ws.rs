//! Evaluation WebSocket.
//!
//! The first frame must be an `eval-handshake` naming the game and its
//! board. Live games then stream one update per new position; archived games
//! get their full history once and the socket closes.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use wallwars_core::{GameConfig, Variant};
use engine_bridge::eval::EvalEvent;

use super::send_json;
use crate::archive::ArchivedMatch;
use crate::eval_hub;
use crate::protocol::{EvalClientMessage, EvalServerMessage};
use crate::registry::{MatchHandle, Registry};

type Sender = SplitSink<WebSocket, Message>;

/// GET /ws/eval
pub async fn ws_handler(ws: WebSocketUpgrade, Extension(registry): Extension<Registry>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

enum Source {
    Live(MatchHandle),
    Archived(ArchivedMatch),
}

struct Handshake {
    game_id: String,
    variant: Variant,
    board_width: usize,
    board_height: usize,
}

impl Handshake {
    fn matches(&self, config: &GameConfig) -> bool {
        config.variant == self.variant
            && config.board_width == self.board_width
            && config.board_height == self.board_height
    }
}

fn error(message: impl Into<String>) -> EvalServerMessage {
    EvalServerMessage::Error {
        message: message.into(),
    }
}

async fn handle_socket(socket: WebSocket, registry: Registry) {
    let (mut sender, mut receiver) = socket.split();

    let Some(handshake) = read_handshake(&mut sender, &mut receiver).await else {
        return;
    };

    let source = match resolve(&registry, &handshake).await {
        Ok(source) => source,
        Err(message) => {
            debug!(game_id = %handshake.game_id, %message, "Eval handshake rejected");
            let _ = send_json(&mut sender, &error(message)).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    if send_json(&mut sender, &EvalServerMessage::EvalHandshakeAccepted).await.is_err() {
        return;
    }
    info!(game_id = %handshake.game_id, "Eval observer connected");

    match source {
        Source::Live(handle) => stream_live(sender, receiver, handle).await,
        Source::Archived(record) => {
            let engine = &registry.config().engine;
            let reply = match eval_hub::replay_history(&record.match_id, engine, &record.state).await {
                Ok(entries) => EvalServerMessage::EvalHistory { entries },
                Err(e) => {
                    warn!(game_id = %record.match_id, error = %e, "Replay evaluation failed");
                    error(format!("Evaluation failed: {e}"))
                }
            };
            let _ = send_json(&mut sender, &reply).await;
            let _ = sender.send(Message::Close(None)).await;
        }
    }
}

async fn read_handshake(sender: &mut Sender, receiver: &mut SplitStream<WebSocket>) -> Option<Handshake> {
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => return None,
            _ => continue,
        };
        match serde_json::from_str::<EvalClientMessage>(text.as_str()) {
            Ok(EvalClientMessage::EvalHandshake {
                game_id,
                variant,
                board_width,
                board_height,
            }) => {
                return Some(Handshake {
                    game_id,
                    variant,
                    board_width,
                    board_height,
                })
            }
            Err(e) => {
                if send_json(sender, &error(format!("Expected eval-handshake: {e}"))).await.is_err() {
                    return None;
                }
            }
        }
    }
    None
}

async fn resolve(registry: &Registry, handshake: &Handshake) -> Result<Source, String> {
    let (config, source) = if let Some(handle) = registry.get(&handshake.game_id).await {
        (handle.view().snapshot.config, Source::Live(handle))
    } else {
        match registry.archive().get(&handshake.game_id).await {
            Ok(Some(record)) => (record.state.config().clone(), Source::Archived(record)),
            Ok(None) => return Err(format!("Unknown game {}", handshake.game_id)),
            Err(e) => return Err(format!("Could not load game {}: {e}", handshake.game_id)),
        }
    };
    if !handshake.matches(&config) {
        return Err("Handshake does not match the game configuration".to_string());
    }
    Ok(source)
}

async fn stream_live(mut sender: Sender, mut receiver: SplitStream<WebSocket>, handle: MatchHandle) {
    let Ok(subscription) = handle.subscribe_eval().await else {
        let _ = send_json(&mut sender, &error("Match has ended")).await;
        return;
    };
    let history = EvalServerMessage::EvalHistory {
        entries: subscription.history,
    };
    if send_json(&mut sender, &history).await.is_err() {
        return;
    }
    let mut updates = subscription.updates;

    loop {
        tokio::select! {
            event = updates.recv() => {
                let message = match event {
                    Ok(EvalEvent::Update(entry)) => EvalServerMessage::EvalUpdate { entry },
                    Ok(EvalEvent::History(entries)) => EvalServerMessage::EvalHistory { entries },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(match_id = %handle.id(), skipped, "Eval observer lagged, resubscribing");
                        match handle.subscribe_eval().await {
                            Ok(fresh) => {
                                updates = fresh.updates;
                                EvalServerMessage::EvalHistory { entries: fresh.history }
                            }
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_json(&mut sender, &message).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => continue,
            }
        }
    }
    debug!(match_id = %handle.id(), "Eval observer disconnected");
}
