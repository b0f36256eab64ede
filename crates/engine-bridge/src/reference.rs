//! Greedy reference engine speaking BGS.
//!
//! Backs the `greedy-engine` binary and the builtin engine source. Moves come
//! from the local greedy policy; evaluations from the distance heuristic.

use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use wallwars_core::notation::{move_from_standard_notation, move_to_standard_notation};
use wallwars_core::{ai, GameAction, GameState};

use crate::protocol::{BgsConfig, BgsRequest, BgsResponse, MAX_SESSIONS};

/// Engine sessions have no clocks; give them more time than any game lasts.
const SESSION_CLOCK_SECONDS: u32 = 1_000_000;

/// Reads requests until EOF, answering each one on `writer`.
pub async fn serve<R, W>(reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut engine = ReferenceEngine::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: BgsRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!("Ignoring unparseable request: {e}");
                continue;
            }
        };

        let response = engine.handle(request);
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }

    info!(sessions = engine.sessions.len(), "Reference engine input closed");
    Ok(())
}

#[derive(Default)]
pub struct ReferenceEngine {
    sessions: HashMap<String, GameState>,
}

impl ReferenceEngine {
    pub fn handle(&mut self, request: BgsRequest) -> BgsResponse {
        match request {
            BgsRequest::StartGameSession {
                bgs_id,
                bot_id,
                config,
            } => {
                let result = self.start(&bgs_id, &config);
                if result.is_ok() {
                    debug!(bgs_id = %bgs_id, bot_id = %bot_id, "Session started");
                }
                let (success, error) = split(result);
                BgsResponse::GameSessionStarted {
                    bgs_id,
                    success,
                    error,
                }
            }
            BgsRequest::EndGameSession { bgs_id } => {
                let (success, error) = match self.sessions.remove(&bgs_id) {
                    Some(_) => (true, String::new()),
                    None => (false, format!("Unknown session {bgs_id}")),
                };
                BgsResponse::GameSessionEnded {
                    bgs_id,
                    success,
                    error,
                }
            }
            BgsRequest::EvaluatePosition {
                bgs_id,
                expected_ply,
            } => {
                let ply = self.sessions.get(&bgs_id).map_or(0, |s| s.ply());
                match self.evaluate(&bgs_id, expected_ply) {
                    Ok((best_move, evaluation)) => BgsResponse::EvaluateResponse {
                        bgs_id,
                        ply,
                        best_move,
                        evaluation,
                        success: true,
                        error: String::new(),
                    },
                    Err(error) => BgsResponse::EvaluateResponse {
                        bgs_id,
                        ply,
                        best_move: String::new(),
                        evaluation: 0.0,
                        success: false,
                        error,
                    },
                }
            }
            BgsRequest::ApplyMove {
                bgs_id,
                expected_ply,
                mv,
            } => {
                let result = self.apply(&bgs_id, expected_ply, &mv);
                let ply = self.sessions.get(&bgs_id).map_or(0, |s| s.ply());
                let (success, error) = split(result);
                BgsResponse::MoveApplied {
                    bgs_id,
                    ply,
                    success,
                    error,
                }
            }
        }
    }

    fn start(&mut self, bgs_id: &str, config: &BgsConfig) -> Result<(), String> {
        if self.sessions.contains_key(bgs_id) {
            return Err(format!("Session {bgs_id} already exists"));
        }
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(format!("Too many sessions (max {MAX_SESSIONS})"));
        }
        let game_config = config
            .to_game_config()
            .ok_or_else(|| "Every player needs a mouse or home".to_string())?
            .with_time_control(SESSION_CLOCK_SECONDS, 0);
        let state = GameState::new(game_config, 0).map_err(|e| e.to_string())?;
        self.sessions.insert(bgs_id.to_string(), state);
        Ok(())
    }

    fn session(&self, bgs_id: &str, expected_ply: usize) -> Result<&GameState, String> {
        let state = self
            .sessions
            .get(bgs_id)
            .ok_or_else(|| format!("Unknown session {bgs_id}"))?;
        if state.ply() != expected_ply {
            return Err(format!("Ply mismatch: at {}, expected {expected_ply}", state.ply()));
        }
        Ok(state)
    }

    fn evaluate(&self, bgs_id: &str, expected_ply: usize) -> Result<(String, f64), String> {
        let state = self.session(bgs_id, expected_ply)?;
        let evaluation = ai::evaluate(state);
        let best_move = ai::choose_move(state, state.turn())
            .map(|mv| move_to_standard_notation(&mv, state.config().board_height))
            .unwrap_or_default();
        Ok((best_move, evaluation))
    }

    fn apply(&mut self, bgs_id: &str, expected_ply: usize, notation: &str) -> Result<(), String> {
        let state = self.session(bgs_id, expected_ply)?;
        let mv = move_from_standard_notation(notation, state.config().board_height)
            .map_err(|e| e.to_string())?;
        let next = state
            .apply_game_action(GameAction::Move {
                player_id: state.turn(),
                mv,
                timestamp: 0,
            })
            .map_err(|e| e.to_string())?;
        self.sessions.insert(bgs_id.to_string(), next);
        Ok(())
    }
}

fn split(result: Result<(), String>) -> (bool, String) {
    match result {
        Ok(()) => (true, String::new()),
        Err(e) => (false, e),
    }
}
