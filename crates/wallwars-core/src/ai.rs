//! Position scoring and a greedy local opponent.

use crate::state::GameState;
use crate::types::{Action, Move, PlayerId, Variant};

/// Evaluation in `[-1, 1]`, positive favors player 1.
///
/// Decided games score the result. Otherwise the cat closer to its goal is
/// ahead by how much shorter its path is relative to the other one.
pub fn evaluate(state: &GameState) -> f64 {
    if let Some(result) = state.result() {
        return match result.winner {
            Some(PlayerId::One) => 1.0,
            Some(PlayerId::Two) => -1.0,
            None => 0.0,
        };
    }

    let (Some(mine), Some(theirs)) = (
        state.cat_distance(PlayerId::One),
        state.cat_distance(PlayerId::Two),
    ) else {
        return 0.0;
    };
    relative_advantage(mine as f64, theirs as f64)
}

/// Evaluation from `player`'s side.
pub fn score_for(state: &GameState, player: PlayerId) -> f64 {
    match player {
        PlayerId::One => evaluate(state),
        PlayerId::Two => -evaluate(state),
    }
}

fn relative_advantage(mine: f64, theirs: f64) -> f64 {
    if mine < theirs {
        1.0 - mine / theirs
    } else if mine > theirs {
        -1.0 + theirs / mine
    } else {
        0.0
    }
}

/// Every single action `player` could legally take next. Pawn steps come
/// before walls so ties favour moving.
pub fn candidate_actions(state: &GameState, player: PlayerId) -> Vec<Action> {
    let grid = state.grid();
    let pawns = state.pawns()[player];
    let mut actions: Vec<Action> = grid.neighbors(pawns.cat).map(Action::cat).collect();
    if state.config().variant == Variant::Standard {
        actions.extend(grid.neighbors(pawns.mouse).map(Action::mouse));
    }
    actions.extend(
        state
            .legal_walls()
            .into_iter()
            .map(|w| Action::wall(w.cell, w.orientation)),
    );
    actions
}

/// Picks a move one action at a time, each maximising the evaluation.
/// Stops after the first action if it already captures.
pub fn choose_move(state: &GameState, player: PlayerId) -> Option<Move> {
    if !state.is_playing() {
        return None;
    }
    let scratch = state.scratch();

    let (first, after_first) = best_action(&scratch, player, &[])?;
    if after_first.pawns()[player].cat == after_first.goal(player) {
        return Some(vec![first].into());
    }

    let mut actions = vec![first];
    if let Some((second, _)) = best_action(&scratch, player, &actions) {
        actions.push(second);
    }
    Some(actions.into())
}

fn best_action(state: &GameState, player: PlayerId, prefix: &[Action]) -> Option<(Action, GameState)> {
    let base = state.preview(player, prefix).ok()?;
    let mut best: Option<(Action, GameState, f64)> = None;

    for action in candidate_actions(&base, player) {
        let mut line = prefix.to_vec();
        line.push(action);
        let Ok(after) = state.preview(player, &line) else {
            continue;
        };
        let score = score_for(&after, player);
        if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
            best = Some((action, after, score));
        }
    }

    best.map(|(action, after, _)| (action, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{GameAction, GameConfig};
    use crate::types::{Cell, Pawns, PerPlayer};

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_start_is_balanced() {
        let state = GameState::new(GameConfig::new(Variant::Standard, 6, 6), T0).unwrap();
        assert_eq!(evaluate(&state), 0.0);
    }

    #[test]
    fn test_closer_cat_is_ahead() {
        let mut config = GameConfig::new(Variant::Standard, 6, 6);
        config.initial_pawns = Some(PerPlayer::new(
            Pawns { cat: Cell::new(1, 0), mouse: Cell::new(5, 5) },
            Pawns { cat: Cell::new(0, 5), mouse: Cell::new(0, 0) },
        ));
        let state = GameState::new(config, T0).unwrap();
        // Player 1 needs 1 step, player 2 needs 5.
        assert!((evaluate(&state) - 0.8).abs() < 1e-9);
        assert!((score_for(&state, PlayerId::Two) + 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_greedy_takes_capture() {
        let mut config = GameConfig::new(Variant::Standard, 5, 5);
        config.one_move_rule = false;
        config.initial_pawns = Some(PerPlayer::new(
            Pawns { cat: Cell::new(1, 0), mouse: Cell::new(4, 4) },
            Pawns { cat: Cell::new(0, 4), mouse: Cell::new(0, 0) },
        ));
        let state = GameState::new(config, T0).unwrap();
        let mv = choose_move(&state, PlayerId::One).unwrap();
        assert_eq!(mv.actions, vec![Action::cat(Cell::new(0, 0))]);
    }

    #[test]
    fn test_greedy_move_is_legal() {
        let mut state = GameState::new(GameConfig::new(Variant::Classic, 5, 5), T0).unwrap();
        for ply in 0..6 {
            let player = state.turn();
            let mv = choose_move(&state, player).unwrap();
            state = state
                .apply_game_action(GameAction::Move {
                    player_id: player,
                    mv,
                    timestamp: T0 + 1000 * (ply + 1),
                })
                .unwrap();
            if !state.is_playing() {
                break;
            }
        }
        assert!(state.ply() > 0);
    }
}
