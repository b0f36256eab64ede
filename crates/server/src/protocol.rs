//! WebSocket message types for matches and the evaluation channel.

use serde::{Deserialize, Serialize};
use wallwars_core::{GameConfig, GameResult, GameState, GameStatus, Move, PerPlayer, PlayerId, Variant};
use engine_bridge::eval::EvalEntry;

use crate::controller::ControllerKind;
use crate::negotiation::{OfferKind, OfferRecord};

// ---- Match channel: client → server ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    SubmitMove {
        #[serde(rename = "move")]
        mv: Move,
    },
    Resign,
    GiveTime {
        seconds: u32,
    },
    DrawOffer,
    DrawAccept,
    DrawReject,
    TakebackOffer,
    TakebackAccept,
    TakebackReject,
    RematchOffer,
    RematchAccept,
    RematchReject,
    ChatMessage {
        channel: ChatChannel,
        text: String,
    },
}

/// What a `{kind}-{offer,accept,reject}` message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferVerb {
    Offer,
    Accept,
    Reject,
}

impl ClientMessage {
    pub fn negotiation(&self) -> Option<(OfferKind, OfferVerb)> {
        use ClientMessage::*;
        let pair = match self {
            DrawOffer => (OfferKind::Draw, OfferVerb::Offer),
            DrawAccept => (OfferKind::Draw, OfferVerb::Accept),
            DrawReject => (OfferKind::Draw, OfferVerb::Reject),
            TakebackOffer => (OfferKind::Takeback, OfferVerb::Offer),
            TakebackAccept => (OfferKind::Takeback, OfferVerb::Accept),
            TakebackReject => (OfferKind::Takeback, OfferVerb::Reject),
            RematchOffer => (OfferKind::Rematch, OfferVerb::Offer),
            RematchAccept => (OfferKind::Rematch, OfferVerb::Accept),
            RematchReject => (OfferKind::Rematch, OfferVerb::Reject),
            _ => return None,
        };
        Some(pair)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatChannel {
    /// Seats only; everyone reads it.
    Game,
    /// Anyone connected.
    Audience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatErrorCode {
    TooLong,
    Empty,
    Spectator,
}

// ---- Match channel: server → client ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Welcome {
        socket_id: u64,
        seat: Option<PlayerId>,
    },
    State {
        state: GameState,
    },
    MatchStatus {
        snapshot: MatchSnapshot,
    },
    DrawOffer {
        offer: OfferRecord,
    },
    DrawRejected {
        offer: OfferRecord,
    },
    TakebackOffer {
        offer: OfferRecord,
    },
    TakebackRejected {
        offer: OfferRecord,
    },
    RematchOffer {
        offer: OfferRecord,
    },
    RematchRejected {
        offer: OfferRecord,
    },
    #[serde(rename_all = "camelCase")]
    RematchStarted {
        new_game_id: String,
    },
    ChatMessage {
        channel: ChatChannel,
        /// `None` for spectators
        sender: Option<PlayerId>,
        text: String,
        timestamp: i64,
    },
    ChatError {
        code: ChatErrorCode,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn offer(offer: OfferRecord) -> Self {
        match offer.kind {
            OfferKind::Draw => ServerMessage::DrawOffer { offer },
            OfferKind::Takeback => ServerMessage::TakebackOffer { offer },
            OfferKind::Rematch => ServerMessage::RematchOffer { offer },
        }
    }

    pub fn rejected(offer: OfferRecord) -> Self {
        match offer.kind {
            OfferKind::Draw => ServerMessage::DrawRejected { offer },
            OfferKind::Takeback => ServerMessage::TakebackRejected { offer },
            OfferKind::Rematch => ServerMessage::RematchRejected { offer },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPhase {
    /// A seat is still open.
    Waiting,
    /// Both seats filled, no move played yet.
    Ready,
    InProgress,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatInfo {
    pub controller: Option<ControllerKind>,
    pub name: Option<String>,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: String,
    pub phase: MatchPhase,
    pub config: GameConfig,
    pub seats: PerPlayer<SeatInfo>,
    pub status: GameStatus,
    pub result: Option<GameResult>,
    pub turn: PlayerId,
    pub ply: usize,
    pub spectators: usize,
    pub pending_offers: Vec<OfferRecord>,
    /// Bumped on every takeback.
    pub takebacks: u32,
    pub rematch_of: Option<String>,
    pub next_match_id: Option<String>,
}

// ---- Evaluation channel ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvalClientMessage {
    #[serde(rename_all = "camelCase")]
    EvalHandshake {
        game_id: String,
        variant: Variant,
        board_width: usize,
        board_height: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvalServerMessage {
    EvalHandshakeAccepted,
    EvalHistory {
        entries: Vec<EvalEntry>,
    },
    EvalUpdate {
        #[serde(flatten)]
        entry: EvalEntry,
    },
    Error {
        message: String,
    },
}
