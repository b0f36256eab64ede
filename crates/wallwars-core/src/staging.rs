//! Client-side action staging and premoves.
//!
//! Nothing here is authoritative. The stager only builds [`Move`]s that are
//! then submitted like any other; the server never sees staged actions.

use tracing::debug;

use crate::error::IllegalAction;
use crate::state::GameState;
use crate::types::{Action, Move, PlayerId};

/// What happened to a staged action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Waiting for a second action or an explicit commit.
    Staged,
    /// The turn is full; submit this move.
    Commit(Move),
    /// Queued to run when the turn comes back.
    Premoved,
}

#[derive(Debug, Clone)]
pub struct ActionStager {
    seat: PlayerId,
    staged: Vec<Action>,
    premoves: Vec<Action>,
}

impl ActionStager {
    pub fn new(seat: PlayerId) -> Self {
        Self {
            seat,
            staged: Vec::with_capacity(2),
            premoves: Vec::with_capacity(2),
        }
    }

    pub fn seat(&self) -> PlayerId {
        self.seat
    }

    pub fn staged(&self) -> &[Action] {
        &self.staged
    }

    pub fn premoves(&self) -> &[Action] {
        &self.premoves
    }

    /// Stages on our turn, premoves otherwise. Every action is checked
    /// against `state` together with the ones already queued.
    pub fn stage(&mut self, state: &GameState, action: Action) -> Result<StageOutcome, IllegalAction> {
        let on_turn = state.turn() == self.seat;
        let queue = if on_turn { &mut self.staged } else { &mut self.premoves };
        if queue.len() >= 2 {
            return Err(IllegalAction::BadActionCount(queue.len() + 1));
        }

        let mut candidate = queue.clone();
        candidate.push(action);
        state.preview(self.seat, &candidate)?;
        queue.push(action);

        if !on_turn {
            return Ok(StageOutcome::Premoved);
        }
        if self.staged.len() == 2 {
            return Ok(StageOutcome::Commit(Move::new(std::mem::take(&mut self.staged))));
        }
        Ok(StageOutcome::Staged)
    }

    /// Flushes whatever is staged as one move. A single staged action is the
    /// only way to submit a one-action move.
    pub fn commit(&mut self) -> Option<Move> {
        if self.staged.is_empty() {
            return None;
        }
        Some(Move::new(std::mem::take(&mut self.staged)))
    }

    /// Drops the most recent staged or premoved action.
    pub fn undo(&mut self) -> Option<Action> {
        self.staged.pop().or_else(|| self.premoves.pop())
    }

    /// The position with staged actions applied, for rendering.
    pub fn preview(&self, state: &GameState) -> Option<GameState> {
        if self.staged.is_empty() {
            return None;
        }
        state.preview(self.seat, &self.staged).ok()
    }

    /// Reacts to a fresh authoritative state. When the turn has just come
    /// back, premoves become staged actions; a full turn is returned for
    /// immediate submission. Premoves the new position makes illegal are
    /// discarded.
    pub fn on_state_update(&mut self, state: &GameState) -> Option<Move> {
        if !state.is_playing() {
            self.clear();
            return None;
        }
        if state.turn() != self.seat {
            self.staged.clear();
            return None;
        }
        if self.premoves.is_empty() {
            return None;
        }

        let queued = std::mem::take(&mut self.premoves);
        if let Err(e) = state.preview(self.seat, &queued) {
            debug!(seat = %self.seat, error = %e, "Discarding premoves");
            return None;
        }
        self.staged = queued;
        if self.staged.len() == 2 {
            return self.commit();
        }
        None
    }

    /// Forgets everything, e.g. when the controller is torn down.
    pub fn clear(&mut self) {
        self.staged.clear();
        self.premoves.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{GameAction, GameConfig};
    use crate::types::{Cell, Orientation, Variant};

    const T0: i64 = 1_700_000_000_000;

    fn new_game() -> GameState {
        GameState::new(GameConfig::new(Variant::Standard, 5, 5), T0).unwrap()
    }

    fn submit(state: &GameState, player: PlayerId, mv: Move) -> GameState {
        state
            .apply_game_action(GameAction::Move {
                player_id: player,
                mv,
                timestamp: T0 + 1000 * (state.ply() as i64 + 1),
            })
            .unwrap()
    }

    #[test]
    fn test_two_actions_commit_automatically() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::One);
        assert_eq!(stager.stage(&state, Action::cat(Cell::new(3, 0))).unwrap(), StageOutcome::Staged);
        assert!(stager.preview(&state).is_some());

        let outcome = stager.stage(&state, Action::mouse(Cell::new(3, 4))).unwrap();
        let StageOutcome::Commit(mv) = outcome else {
            panic!("expected a full turn, got {outcome:?}");
        };
        assert_eq!(mv.len(), 2);
        assert!(stager.staged().is_empty());
        submit(&state, PlayerId::One, mv);
    }

    #[test]
    fn test_single_action_needs_explicit_commit() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::One);
        assert_eq!(stager.commit(), None);
        stager.stage(&state, Action::cat(Cell::new(3, 0))).unwrap();
        assert_eq!(stager.commit().map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_illegal_staged_action_rejected() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::One);
        assert!(stager.stage(&state, Action::cat(Cell::new(2, 0))).is_err());
        assert!(stager.staged().is_empty());
    }

    #[test]
    fn test_premove_submitted_when_turn_returns() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::Two);
        assert_eq!(stager.stage(&state, Action::cat(Cell::new(1, 4))).unwrap(), StageOutcome::Premoved);
        assert_eq!(stager.stage(&state, Action::mouse(Cell::new(0, 1))).unwrap(), StageOutcome::Premoved);
        assert!(stager.stage(&state, Action::wall(Cell::new(1, 1), Orientation::Vertical)).is_err());

        let state = submit(&state, PlayerId::One, Move::new(vec![Action::cat(Cell::new(3, 0))]));
        let mv = stager.on_state_update(&state).expect("premoves fill the turn");
        let state = submit(&state, PlayerId::Two, mv);
        assert_eq!(state.pawns().p2.cat, Cell::new(1, 4));
        assert!(stager.premoves().is_empty());
    }

    #[test]
    fn test_premove_discarded_when_blocked() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::Two);
        stager.stage(&state, Action::cat(Cell::new(1, 4))).unwrap();

        // Player 1 walls off the step the premove wanted.
        let state = submit(
            &state,
            PlayerId::One,
            Move::new(vec![Action::wall(Cell::new(1, 4), Orientation::Horizontal)]),
        );
        assert_eq!(stager.on_state_update(&state), None);
        assert!(stager.premoves().is_empty());
        assert!(stager.staged().is_empty());
    }

    #[test]
    fn test_single_premove_becomes_staged() {
        let state = new_game();
        let mut stager = ActionStager::new(PlayerId::Two);
        stager.stage(&state, Action::cat(Cell::new(1, 4))).unwrap();
        let state = submit(&state, PlayerId::One, Move::new(vec![Action::cat(Cell::new(3, 0))]));
        assert_eq!(stager.on_state_update(&state), None);
        assert_eq!(stager.staged(), &[Action::cat(Cell::new(1, 4))]);
    }
}
