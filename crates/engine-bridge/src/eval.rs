//! Per-match evaluation history for passive observers.
//!
//! An [`EvalStream`] holds one entry per position reached (ply 0 is the
//! starting position) and broadcasts each new entry as it is computed. A
//! rewind broadcasts the truncated history so attached observers can replace
//! what they hold.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use wallwars_core::notation::move_to_standard_notation;
use wallwars_core::{ai, GameConfig, GameState};

use crate::bot::EngineBot;
use crate::config::EngineConfig;
use crate::error::BridgeError;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalEntry {
    pub ply: usize,
    /// Positive favors player 1
    pub evaluation: f64,
    pub best_move: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalEvent {
    /// Replaces everything an observer holds.
    History(Vec<EvalEntry>),
    Update(EvalEntry),
}

/// Where evaluations come from.
pub enum Evaluator {
    /// Distance heuristic and greedy policy, computed in-process.
    Heuristic,
    Engine(EngineBot),
}

impl Evaluator {
    /// Opens an engine session named after the game when an engine is
    /// configured, otherwise falls back to the heuristic.
    pub async fn connect(engine: Option<&EngineConfig>, game_id: &str, config: &GameConfig) -> Result<Self, BridgeError> {
        match engine {
            Some(engine) => {
                let bot = EngineBot::connect(engine, format!("eval-{game_id}"), "eval", config).await?;
                Ok(Evaluator::Engine(bot))
            }
            None => Ok(Evaluator::Heuristic),
        }
    }

    pub async fn evaluate(&mut self, state: &GameState) -> Result<EvalEntry, BridgeError> {
        match self {
            Evaluator::Heuristic => {
                let best_move = ai::choose_move(state, state.turn())
                    .map(|mv| move_to_standard_notation(&mv, state.config().board_height));
                Ok(EvalEntry {
                    ply: state.ply(),
                    evaluation: ai::evaluate(state),
                    best_move,
                })
            }
            Evaluator::Engine(bot) => {
                let eval = bot.evaluate(state).await?;
                Ok(EvalEntry {
                    ply: eval.ply,
                    evaluation: eval.evaluation,
                    best_move: Some(eval.best_move).filter(|m| !m.is_empty()),
                })
            }
        }
    }

    /// Ends and recreates the underlying engine session.
    pub async fn reset(&mut self) -> Result<(), BridgeError> {
        match self {
            Evaluator::Heuristic => Ok(()),
            Evaluator::Engine(bot) => bot.restart().await,
        }
    }

    pub async fn shutdown(self) {
        if let Evaluator::Engine(bot) = self {
            bot.shutdown().await;
        }
    }
}

pub struct EvalStream {
    game_id: String,
    evaluator: Evaluator,
    entries: Vec<EvalEntry>,
    updates: broadcast::Sender<EvalEvent>,
}

impl EvalStream {
    pub fn new(game_id: impl Into<String>, evaluator: Evaluator) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            game_id: game_id.into(),
            evaluator,
            entries: Vec::new(),
            updates,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Everything computed so far, ordered by ply.
    pub fn history(&self) -> &[EvalEntry] {
        &self.entries
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EvalEvent> {
        self.updates.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Evaluates every position of `state` not yet in the history and
    /// broadcasts the new entries.
    pub async fn sync(&mut self, state: &GameState) -> Result<Vec<EvalEntry>, BridgeError> {
        let current = state.ply();
        if self.entries.len() > current + 1 {
            self.rewind(current).await?;
        }

        let mut fresh = Vec::new();
        for ply in self.entries.len()..=current {
            let entry = if ply == current {
                self.evaluator.evaluate(state).await?
            } else {
                let position = GameState::replay(state.config().clone(), state.started_at(), &state.history()[..ply])?;
                self.evaluator.evaluate(&position).await?
            };
            debug!(game_id = %self.game_id, ply, evaluation = entry.evaluation, "Evaluated position");
            self.entries.push(entry.clone());
            // No observers is fine.
            let _ = self.updates.send(EvalEvent::Update(entry.clone()));
            fresh.push(entry);
        }
        Ok(fresh)
    }

    /// Drops entries past `ply` and recreates the evaluation session, so
    /// nothing derived from discarded plies is served again.
    pub async fn rewind(&mut self, ply: usize) -> Result<(), BridgeError> {
        info!(game_id = %self.game_id, ply, "Rewinding evaluation history");
        self.entries.truncate(ply + 1);
        let _ = self.updates.send(EvalEvent::History(self.entries.clone()));
        self.evaluator.reset().await
    }

    pub async fn close(self) {
        self.evaluator.shutdown().await;
    }
}
