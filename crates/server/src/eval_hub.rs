//! Evaluation feeds for observers.
//!
//! A live match owns one evaluation task, fed every canonical state in
//! order. Observers subscribe through the same feed so they never miss an
//! entry between reading the history and attaching to updates. Completed
//! matches are evaluated once on demand.

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use wallwars_core::GameState;
use engine_bridge::eval::{EvalEntry, EvalEvent, EvalStream, Evaluator};
use engine_bridge::{BridgeError, EngineConfig};

#[derive(Debug)]
pub enum EvalFeed {
    State(GameState),
    /// History was truncated to this many plies.
    Rewind(usize),
    Subscribe(oneshot::Sender<EvalSubscription>),
}

#[derive(Debug)]
pub struct EvalSubscription {
    pub history: Vec<EvalEntry>,
    pub updates: broadcast::Receiver<EvalEvent>,
}

async fn connect_evaluator(match_id: &str, engine: &EngineConfig, state: &GameState) -> Evaluator {
    match Evaluator::connect(Some(engine), match_id, state.config()).await {
        Ok(evaluator) => evaluator,
        Err(e) => {
            warn!(match_id, error = %e, "Engine unavailable for evaluation, using heuristic");
            Evaluator::Heuristic
        }
    }
}

/// Starts the evaluation task for a live match and seeds it with `initial`.
/// The task ends when the returned sender is dropped.
pub fn spawn_live(match_id: String, engine: EngineConfig, initial: GameState) -> mpsc::UnboundedSender<EvalFeed> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(EvalFeed::State(initial));
    tokio::spawn(run_live(match_id, engine, rx));
    tx
}

async fn run_live(match_id: String, engine: EngineConfig, mut feed: mpsc::UnboundedReceiver<EvalFeed>) {
    let Some(EvalFeed::State(initial)) = feed.recv().await else {
        return;
    };
    let evaluator = connect_evaluator(&match_id, &engine, &initial).await;
    let mut stream = EvalStream::new(match_id.clone(), evaluator);
    if let Err(e) = stream.sync(&initial).await {
        warn!(match_id = %match_id, error = %e, "Initial evaluation failed");
    }

    while let Some(item) = feed.recv().await {
        match item {
            EvalFeed::State(state) => {
                if let Err(e) = stream.sync(&state).await {
                    warn!(match_id = %match_id, ply = state.ply(), error = %e, "Evaluation failed");
                }
            }
            EvalFeed::Rewind(ply) => {
                if let Err(e) = stream.rewind(ply).await {
                    warn!(match_id = %match_id, error = %e, "Evaluation rewind failed");
                }
            }
            EvalFeed::Subscribe(reply) => {
                let _ = reply.send(EvalSubscription {
                    history: stream.history().to_vec(),
                    updates: stream.subscribe(),
                });
                debug!(match_id = %match_id, observers = stream.observer_count(), "Evaluation observer attached");
            }
        }
    }

    info!(match_id = %match_id, entries = stream.history().len(), "Evaluation feed closed");
    stream.close().await;
}

/// Evaluates every position of a finished game with a short-lived session.
pub async fn replay_history(match_id: &str, engine: &EngineConfig, state: &GameState) -> Result<Vec<EvalEntry>, BridgeError> {
    let evaluator = connect_evaluator(match_id, engine, state).await;
    let mut stream = EvalStream::new(format!("{match_id}-replay"), evaluator);
    let result = stream.sync(state).await;
    stream.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wallwars_core::{ai, GameAction, GameConfig, Variant};

    const T0: i64 = 1_700_000_000_000;

    fn advance(state: &GameState, at: i64) -> GameState {
        let player = state.turn();
        let mv = ai::choose_move(state, player).unwrap();
        state
            .apply_game_action(GameAction::Move {
                player_id: player,
                mv,
                timestamp: at,
            })
            .unwrap()
    }

    async fn subscribe(feed: &mpsc::UnboundedSender<EvalFeed>) -> EvalSubscription {
        let (tx, rx) = oneshot::channel();
        feed.send(EvalFeed::Subscribe(tx)).unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_live_feed_streams_new_positions() {
        let engine = EngineConfig::builtin(Duration::from_secs(5));
        let start = GameState::new(GameConfig::new(Variant::Standard, 5, 5), T0).unwrap();
        let feed = spawn_live("live-1".into(), engine, start.clone());

        let mut sub = subscribe(&feed).await;
        assert_eq!(sub.history.len(), 1);

        let next = advance(&start, T0 + 1000);
        feed.send(EvalFeed::State(next)).unwrap();
        match sub.updates.recv().await.unwrap() {
            EvalEvent::Update(entry) => assert_eq!(entry.ply, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replay_history_covers_game() {
        let engine = EngineConfig::builtin(Duration::from_secs(5));
        let mut state = GameState::new(GameConfig::new(Variant::Standard, 5, 5), T0).unwrap();
        for i in 1..=3 {
            state = advance(&state, T0 + i * 1000);
        }
        let entries = replay_history("done-1", &engine, &state).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.ply).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
