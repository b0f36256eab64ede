//! Engine-driven seat: keeps one BGS session in step with the match history
//! and turns the engine's suggestion into a vetted [`Move`].

use tracing::{debug, info};
use wallwars_core::notation::{move_from_standard_notation, move_to_standard_notation};
use wallwars_core::{GameConfig, GameState, Move, PlayerId};

use crate::config::EngineConfig;
use crate::engine::{BgsEngine, Evaluation};
use crate::error::BridgeError;
use crate::protocol::BgsConfig;

pub struct EngineBot {
    engine: BgsEngine,
    bgs_id: String,
    bot_id: String,
    config: GameConfig,
    /// Notation of every ply the engine session has seen, in order.
    applied: Vec<String>,
}

impl EngineBot {
    pub async fn connect(
        engine_config: &EngineConfig,
        bgs_id: impl Into<String>,
        bot_id: impl Into<String>,
        config: &GameConfig,
    ) -> Result<Self, BridgeError> {
        let engine = BgsEngine::connect(engine_config).await?;
        Self::start(engine, bgs_id.into(), bot_id.into(), config.clone()).await
    }

    pub async fn start(
        mut engine: BgsEngine,
        bgs_id: String,
        bot_id: String,
        config: GameConfig,
    ) -> Result<Self, BridgeError> {
        engine
            .start_session(&bgs_id, &bot_id, BgsConfig::from_game_config(&config))
            .await?;
        info!(bgs_id = %bgs_id, bot_id = %bot_id, "Engine session started");
        Ok(Self {
            engine,
            bgs_id,
            bot_id,
            config,
            applied: Vec::new(),
        })
    }

    pub fn bgs_id(&self) -> &str {
        &self.bgs_id
    }

    /// Asks the engine for `player`'s move in `state`. The answer must parse
    /// and be legal for `player`; anything else is a fault, never retried.
    pub async fn request_move(&mut self, state: &GameState, player: PlayerId) -> Result<Move, BridgeError> {
        let eval = self.evaluate(state).await?;
        let mv = move_from_standard_notation(&eval.best_move, self.config.board_height)
            .map_err(|e| BridgeError::Malformed(format!("best move '{}': {e}", eval.best_move)))?;
        state.preview(player, &mv.actions)?;
        Ok(mv)
    }

    /// Evaluates `state` after bringing the engine session up to date.
    pub async fn evaluate(&mut self, state: &GameState) -> Result<Evaluation, BridgeError> {
        self.sync(state).await?;
        self.engine.evaluate(&self.bgs_id, state.ply()).await
    }

    /// Replays onto the engine whatever plies it has not seen. A history
    /// that no longer extends what was sent (a takeback) restarts the session.
    async fn sync(&mut self, state: &GameState) -> Result<(), BridgeError> {
        let rows = self.config.board_height;
        let history: Vec<String> = state
            .history()
            .iter()
            .map(|entry| move_to_standard_notation(&entry.mv, rows))
            .collect();

        let diverged = self.applied.len() > history.len()
            || self.applied.iter().zip(&history).any(|(sent, actual)| sent != actual);
        if diverged {
            debug!(bgs_id = %self.bgs_id, "History rewound, restarting engine session");
            self.restart().await?;
        }

        for notation in &history[self.applied.len()..] {
            self.engine
                .apply_move(&self.bgs_id, self.applied.len(), notation)
                .await?;
            self.applied.push(notation.clone());
        }
        Ok(())
    }

    /// Ends and recreates the engine session from the initial position.
    pub async fn restart(&mut self) -> Result<(), BridgeError> {
        self.engine.end_session(&self.bgs_id).await?;
        self.engine
            .start_session(&self.bgs_id, &self.bot_id, BgsConfig::from_game_config(&self.config))
            .await?;
        self.applied.clear();
        Ok(())
    }

    pub async fn shutdown(mut self) {
        let _ = self.engine.end_session(&self.bgs_id).await;
        self.engine.quit().await;
    }
}
