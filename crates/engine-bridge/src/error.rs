//! Bridge error types. Every variant is a controller fault from the match's
//! point of view, never a rules violation by the opponent.

use std::time::Duration;

use thiserror::Error;
use wallwars_core::{IllegalAction, ReplayError};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start engine: {0}")]
    Spawn(std::io::Error),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Engine connection is closed")]
    Closed,

    #[error("Malformed engine response: {0}")]
    Malformed(String),

    #[error("Engine reported an error: {0}")]
    Engine(String),

    #[error("Engine suggested an illegal move: {0}")]
    IllegalMove(#[from] IllegalAction),

    #[error("Could not rebuild position: {0}")]
    Replay(#[from] ReplayError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
