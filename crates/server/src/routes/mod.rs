use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use serde::Serialize;

pub mod eval_ws;
pub mod game_ws;
pub mod health;
pub mod matches;

/// Writes one JSON text frame.
pub(crate) async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &impl Serialize,
) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text.into())).await,
        Err(e) => {
            tracing::error!("Failed to serialize outgoing frame: {e}");
            Ok(())
        }
    }
}
