//! BGS wire types: one JSON object per line in each direction.
//!
//! Moves travel in standard notation. Evaluations are from player 1's point
//! of view and clamped to `[-1, 1]`.

use serde::{Deserialize, Serialize};
use wallwars_core::{Cell, GameConfig, Pawns, PerPlayer, Variant, Wall};

/// Engines may refuse to hold more sessions than this.
pub const MAX_SESSIONS: usize = 256;

// ---- Requests ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BgsRequest {
    #[serde(rename_all = "camelCase")]
    StartGameSession {
        bgs_id: String,
        bot_id: String,
        config: BgsConfig,
    },
    #[serde(rename_all = "camelCase")]
    EndGameSession { bgs_id: String },
    #[serde(rename_all = "camelCase")]
    EvaluatePosition { bgs_id: String, expected_ply: usize },
    #[serde(rename_all = "camelCase")]
    ApplyMove {
        bgs_id: String,
        expected_ply: usize,
        #[serde(rename = "move")]
        mv: String,
    },
}

impl BgsRequest {
    pub fn bgs_id(&self) -> &str {
        match self {
            BgsRequest::StartGameSession { bgs_id, .. }
            | BgsRequest::EndGameSession { bgs_id }
            | BgsRequest::EvaluatePosition { bgs_id, .. }
            | BgsRequest::ApplyMove { bgs_id, .. } => bgs_id,
        }
    }

    /// The response type tag a well-behaved engine answers with.
    pub fn expected_response(&self) -> &'static str {
        match self {
            BgsRequest::StartGameSession { .. } => "game_session_started",
            BgsRequest::EndGameSession { .. } => "game_session_ended",
            BgsRequest::EvaluatePosition { .. } => "evaluate_response",
            BgsRequest::ApplyMove { .. } => "move_applied",
        }
    }
}

// ---- Responses ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BgsResponse {
    #[serde(rename_all = "camelCase")]
    GameSessionStarted {
        bgs_id: String,
        success: bool,
        #[serde(default)]
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    GameSessionEnded {
        bgs_id: String,
        success: bool,
        #[serde(default)]
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    EvaluateResponse {
        bgs_id: String,
        ply: usize,
        #[serde(default)]
        best_move: String,
        #[serde(default)]
        evaluation: f64,
        success: bool,
        #[serde(default)]
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    MoveApplied {
        bgs_id: String,
        ply: usize,
        success: bool,
        #[serde(default)]
        error: String,
    },
}

impl BgsResponse {
    pub fn type_tag(&self) -> &'static str {
        match self {
            BgsResponse::GameSessionStarted { .. } => "game_session_started",
            BgsResponse::GameSessionEnded { .. } => "game_session_ended",
            BgsResponse::EvaluateResponse { .. } => "evaluate_response",
            BgsResponse::MoveApplied { .. } => "move_applied",
        }
    }

    pub fn bgs_id(&self) -> &str {
        match self {
            BgsResponse::GameSessionStarted { bgs_id, .. }
            | BgsResponse::GameSessionEnded { bgs_id, .. }
            | BgsResponse::EvaluateResponse { bgs_id, .. }
            | BgsResponse::MoveApplied { bgs_id, .. } => bgs_id,
        }
    }

    /// `Err(message)` when the engine reported a failure.
    pub fn outcome(&self) -> Result<(), String> {
        let (success, error) = match self {
            BgsResponse::GameSessionStarted { success, error, .. }
            | BgsResponse::GameSessionEnded { success, error, .. }
            | BgsResponse::EvaluateResponse { success, error, .. }
            | BgsResponse::MoveApplied { success, error, .. } => (*success, error),
        };
        if success {
            Ok(())
        } else {
            Err(error.clone())
        }
    }
}

// ---- Session configuration ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgsConfig {
    pub variant: Variant,
    pub board_width: usize,
    pub board_height: usize,
    pub initial_state: BgsInitialState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgsInitialState {
    pub pawns: BgsPlayers,
    #[serde(default)]
    pub walls: Vec<Wall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BgsPlayers {
    pub p1: BgsPawns,
    pub p2: BgsPawns,
}

/// The goal pawn is named `mouse` in the standard variant and `home` in the
/// classic one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BgsPawns {
    pub cat: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouse: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<Cell>,
}

impl BgsPawns {
    fn from_pawns(pawns: Pawns, variant: Variant) -> Self {
        match variant {
            Variant::Standard => Self {
                cat: pawns.cat,
                mouse: Some(pawns.mouse),
                home: None,
            },
            Variant::Classic => Self {
                cat: pawns.cat,
                mouse: None,
                home: Some(pawns.mouse),
            },
        }
    }

    fn to_pawns(self) -> Option<Pawns> {
        Some(Pawns {
            cat: self.cat,
            mouse: self.mouse.or(self.home)?,
        })
    }
}

impl BgsConfig {
    pub fn from_game_config(config: &GameConfig) -> Self {
        let pawns = config.starting_pawns();
        Self {
            variant: config.variant,
            board_width: config.board_width,
            board_height: config.board_height,
            initial_state: BgsInitialState {
                pawns: BgsPlayers {
                    p1: BgsPawns::from_pawns(pawns.p1, config.variant),
                    p2: BgsPawns::from_pawns(pawns.p2, config.variant),
                },
                walls: config
                    .initial_walls
                    .iter()
                    .map(|w| Wall::new(w.cell, w.orientation))
                    .collect(),
            },
        }
    }

    /// The game this session plays. `None` if a goal pawn is missing.
    pub fn to_game_config(&self) -> Option<GameConfig> {
        let p1 = self.initial_state.pawns.p1.to_pawns()?;
        let p2 = self.initial_state.pawns.p2.to_pawns()?;
        let mut config = GameConfig::new(self.variant, self.board_width, self.board_height);
        config.initial_pawns = Some(PerPlayer::new(p1, p2));
        config.initial_walls = self.initial_state.walls.clone();
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = BgsRequest::ApplyMove {
            bgs_id: "m1-p2".into(),
            expected_ply: 3,
            mv: "Ca4.>b2".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "apply_move");
        assert_eq!(json["bgsId"], "m1-p2");
        assert_eq!(json["expectedPly"], 3);
        assert_eq!(json["move"], "Ca4.>b2");
    }

    #[test]
    fn test_parse_evaluate_response() {
        let line = r#"{"type":"evaluate_response","bgsId":"g","ply":2,"bestMove":"Cb3","evaluation":0.25,"success":true,"error":""}"#;
        let resp: BgsResponse = serde_json::from_str(line).unwrap();
        assert_eq!(resp.type_tag(), "evaluate_response");
        assert_eq!(resp.outcome(), Ok(()));
        match resp {
            BgsResponse::EvaluateResponse { ply, best_move, .. } => {
                assert_eq!(ply, 2);
                assert_eq!(best_move, "Cb3");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classic_config_uses_home() {
        let config = GameConfig::new(Variant::Classic, 6, 5);
        let bgs = BgsConfig::from_game_config(&config);
        let json = serde_json::to_value(&bgs).unwrap();
        assert_eq!(json["boardWidth"], 6);
        assert_eq!(json["initialState"]["pawns"]["p1"]["home"], serde_json::json!([4, 0]));
        assert!(json["initialState"]["pawns"]["p1"].get("mouse").is_none());

        let back = bgs.to_game_config().unwrap();
        assert_eq!(back.starting_pawns(), config.starting_pawns());
    }
}
