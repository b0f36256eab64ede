//! Drivers for server-driven seats.
//!
//! Each bot seat gets one task that answers move requests in order. Only the
//! newest request is worked on; the match drops answers for positions that
//! have since changed. Dropping the [`BotDriver`] tears the task down.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wallwars_core::{ai, GameConfig, GameState, Move, PlayerId};
use engine_bridge::bot::EngineBot;
use engine_bridge::{BridgeError, EngineConfig};

use crate::controller::ControllerKind;

#[derive(Debug)]
pub struct MoveRequest {
    pub version: u64,
    pub state: GameState,
}

#[derive(Debug)]
pub struct MoveReply {
    pub seat: PlayerId,
    pub version: u64,
    /// `Err` is a controller fault, never retried.
    pub result: Result<Move, String>,
}

pub struct BotDriver {
    requests: mpsc::UnboundedSender<MoveRequest>,
}

impl BotDriver {
    pub fn spawn(
        match_id: &str,
        seat: PlayerId,
        kind: ControllerKind,
        engine: &EngineConfig,
        config: &GameConfig,
        replies: mpsc::UnboundedSender<MoveReply>,
    ) -> Self {
        let brain = match kind {
            ControllerKind::RemoteBot => Brain::Engine {
                engine: engine.clone(),
                bgs_id: format!("{match_id}-p{}", seat.number()),
                config: config.clone(),
                bot: None,
            },
            _ => Brain::Local,
        };
        let (requests, rx) = mpsc::unbounded_channel();
        info!(match_id, seat = seat.number(), controller = ?kind, "Bot driver started");
        tokio::spawn(run(brain, seat, rx, replies));
        Self { requests }
    }

    pub fn request(&self, version: u64, state: GameState) {
        if self.requests.send(MoveRequest { version, state }).is_err() {
            warn!("Bot driver is gone, move request dropped");
        }
    }
}

async fn run(
    mut brain: Brain,
    seat: PlayerId,
    mut requests: mpsc::UnboundedReceiver<MoveRequest>,
    replies: mpsc::UnboundedSender<MoveReply>,
) {
    while let Some(mut request) = requests.recv().await {
        while let Ok(newer) = requests.try_recv() {
            request = newer;
        }
        debug!(seat = seat.number(), version = request.version, ply = request.state.ply(), "Thinking");
        let result = brain.choose(&request.state, seat).await;
        let reply = MoveReply {
            seat,
            version: request.version,
            result,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    brain.shutdown().await;
    debug!(seat = seat.number(), "Bot driver stopped");
}

enum Brain {
    Local,
    Engine {
        engine: EngineConfig,
        bgs_id: String,
        config: GameConfig,
        /// Connected on first use; dropped after a fault.
        bot: Option<EngineBot>,
    },
}

impl Brain {
    async fn choose(&mut self, state: &GameState, seat: PlayerId) -> Result<Move, String> {
        match self {
            Brain::Local => {
                let state = state.clone();
                tokio::task::spawn_blocking(move || ai::choose_move(&state, seat))
                    .await
                    .map_err(|e| format!("local AI crashed: {e}"))?
                    .ok_or_else(|| "no legal move".to_string())
            }
            Brain::Engine {
                engine,
                bgs_id,
                config,
                bot,
            } => {
                let timeout = engine.move_timeout;
                let outcome = tokio::time::timeout(timeout, async {
                    if bot.is_none() {
                        match EngineBot::connect(engine, bgs_id.clone(), "wallwars", config).await {
                            Ok(connected) => *bot = Some(connected),
                            Err(e) => return Err(e),
                        }
                    }
                    match bot.as_mut() {
                        Some(b) => b.request_move(state, seat).await,
                        None => Err(BridgeError::Closed),
                    }
                })
                .await;

                match outcome {
                    Ok(Ok(mv)) => Ok(mv),
                    Ok(Err(e)) => {
                        *bot = None;
                        Err(e.to_string())
                    }
                    Err(_) => {
                        *bot = None;
                        Err(format!("no move within {} ms", timeout.as_millis()))
                    }
                }
            }
        }
    }

    async fn shutdown(self) {
        if let Brain::Engine { bot: Some(bot), .. } = self {
            bot.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wallwars_core::Variant;

    #[tokio::test]
    async fn test_local_ai_answers_with_legal_move() {
        let config = GameConfig::new(Variant::Standard, 5, 5);
        let state = GameState::new(config.clone(), 0).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = BotDriver::spawn(
            "m1",
            PlayerId::One,
            ControllerKind::LocalAi,
            &EngineConfig::builtin(Duration::from_secs(5)),
            &config,
            tx,
        );

        driver.request(3, state.clone());
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.version, 3);
        let mv = reply.result.unwrap();
        assert!(state.preview(PlayerId::One, &mv.actions).is_ok());
    }

    #[tokio::test]
    async fn test_remote_bot_uses_engine() {
        let config = GameConfig::new(Variant::Classic, 6, 6);
        let state = GameState::new(config.clone(), 0).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = BotDriver::spawn(
            "m2",
            PlayerId::One,
            ControllerKind::RemoteBot,
            &EngineConfig::builtin(Duration::from_secs(5)),
            &config,
            tx,
        );

        driver.request(1, state.clone());
        let reply = rx.recv().await.unwrap();
        assert!(reply.result.is_ok(), "{:?}", reply.result);
    }
}
