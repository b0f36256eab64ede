//! The authoritative game state and its single mutation entry point.
//!
//! [`GameState::apply_game_action`] never mutates `self`: it validates against
//! a private copy and hands back the successor state, so a rejected action
//! cannot leave anything half-applied.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, IllegalAction, ReplayError};
use crate::grid::{Grid, Route};
use crate::types::{Action, ActionKind, Cell, Move, PawnKind, Pawns, PerPlayer, PlayerId, Variant, Wall};

pub const MIN_BOARD_SIZE: usize = 3;
pub const MAX_BOARD_SIZE: usize = 16;

/// Upper bound for a single give-time gift.
pub const MAX_TIME_GIFT_SECONDS: u32 = 600;

/// Steps player 2's cat may still need for the one-move rule to call a draw.
const ONE_MOVE_RULE_REACH: usize = 2;

// ---- Configuration ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub initial_seconds: u32,
    #[serde(default)]
    pub increment_seconds: u32,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            initial_seconds: 300,
            increment_seconds: 2,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub variant: Variant,
    pub board_width: usize,
    pub board_height: usize,
    #[serde(default)]
    pub time_control: TimeControl,
    /// A capture by player 1 is a draw when player 2's cat could reach
    /// player 1's mouse with its reply.
    #[serde(default = "default_true")]
    pub one_move_rule: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pawns: Option<PerPlayer<Pawns>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_walls: Vec<Wall>,
}

impl GameConfig {
    pub fn new(variant: Variant, board_width: usize, board_height: usize) -> Self {
        Self {
            variant,
            board_width,
            board_height,
            time_control: TimeControl::default(),
            one_move_rule: true,
            initial_pawns: None,
            initial_walls: Vec::new(),
        }
    }

    pub fn with_time_control(mut self, initial_seconds: u32, increment_seconds: u32) -> Self {
        self.time_control = TimeControl {
            initial_seconds,
            increment_seconds,
        };
        self
    }

    /// Starting pawns: the override when present, otherwise the corner layout
    /// for the variant.
    pub fn starting_pawns(&self) -> PerPlayer<Pawns> {
        if let Some(pawns) = self.initial_pawns {
            return pawns;
        }
        let last_row = self.board_height.saturating_sub(1);
        let last_col = self.board_width.saturating_sub(1);
        match self.variant {
            Variant::Standard => PerPlayer::new(
                Pawns {
                    cat: Cell::new(last_row, 0),
                    mouse: Cell::new(last_row, last_col),
                },
                Pawns {
                    cat: Cell::new(0, last_col),
                    mouse: Cell::new(0, 0),
                },
            ),
            Variant::Classic => PerPlayer::new(
                Pawns {
                    cat: Cell::new(0, 0),
                    mouse: Cell::new(last_row, 0),
                },
                Pawns {
                    cat: Cell::new(0, last_col),
                    mouse: Cell::new(last_row, last_col),
                },
            ),
        }
    }

    /// Builds the starting grid, rejecting anything unplayable.
    pub fn initial_grid(&self) -> Result<Grid, ConfigError> {
        let size_ok = |n: usize| (MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&n);
        if !size_ok(self.board_width) || !size_ok(self.board_height) {
            return Err(ConfigError::InvalidDimensions {
                width: self.board_width,
                height: self.board_height,
                min: MIN_BOARD_SIZE,
                max: MAX_BOARD_SIZE,
            });
        }
        if self.time_control.initial_seconds == 0 {
            return Err(ConfigError::InvalidTimeControl);
        }

        let mut grid = Grid::new(self.board_width, self.board_height);
        let pawns = self.starting_pawns();
        for player in PlayerId::ALL {
            for cell in [pawns[player].cat, pawns[player].mouse] {
                if !grid.contains(cell) {
                    return Err(ConfigError::PawnOutOfBounds(cell));
                }
            }
        }

        let routes = routes_for(&pawns);
        for wall in &self.initial_walls {
            grid.place_wall(*wall, &routes)
                .map_err(ConfigError::InvalidWall)?;
        }
        Ok(grid)
    }
}

// ---- Status and results ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Playing,
    Finished,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultReason {
    Capture,
    Timeout,
    Resignation,
    DrawAgreement,
    OneMoveRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    /// `None` for a draw.
    pub winner: Option<PlayerId>,
    pub reason: ResultReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub index: usize,
    pub player_id: PlayerId,
    #[serde(rename = "move")]
    pub mv: Move,
    /// Pawn positions after the move.
    pub pawns: PerPlayer<Pawns>,
    pub walls_added: Vec<Wall>,
    /// Both clocks after the move, in milliseconds. Time gifts are not part
    /// of history, so replay takes the clocks from here.
    pub clocks_ms: PerPlayer<i64>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// Everything that can change a game, tagged with who did it and when
/// (epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    Move {
        player_id: PlayerId,
        mv: Move,
        timestamp: i64,
    },
    Resign {
        player_id: PlayerId,
        timestamp: i64,
    },
    /// Adds time to the opponent's clock.
    GiveTime {
        player_id: PlayerId,
        seconds: u32,
        timestamp: i64,
    },
    /// Flags the player to move if their clock has run out.
    TimeoutCheck {
        player_id: PlayerId,
        timestamp: i64,
    },
    AgreeDraw {
        player_id: PlayerId,
        timestamp: i64,
    },
}

impl GameAction {
    pub fn player_id(&self) -> PlayerId {
        match self {
            GameAction::Move { player_id, .. }
            | GameAction::Resign { player_id, .. }
            | GameAction::GiveTime { player_id, .. }
            | GameAction::TimeoutCheck { player_id, .. }
            | GameAction::AgreeDraw { player_id, .. } => *player_id,
        }
    }
}

// ---- Game state ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SerializedGameState", into = "SerializedGameState")]
pub struct GameState {
    config: GameConfig,
    grid: Grid,
    pawns: PerPlayer<Pawns>,
    turn: PlayerId,
    clocks_ms: PerPlayer<i64>,
    started_at: i64,
    last_move_time: i64,
    history: Vec<HistoryEntry>,
    status: GameStatus,
    result: Option<GameResult>,
}

impl GameState {
    /// A fresh game whose first clock starts running at `started_at`.
    pub fn new(config: GameConfig, started_at: i64) -> Result<Self, ConfigError> {
        let grid = config.initial_grid()?;
        let pawns = config.starting_pawns();
        let initial_ms = i64::from(config.time_control.initial_seconds) * 1000;
        Ok(Self {
            config,
            grid,
            pawns,
            turn: PlayerId::One,
            clocks_ms: PerPlayer::new(initial_ms, initial_ms),
            started_at,
            last_move_time: started_at,
            history: Vec::new(),
            status: GameStatus::Playing,
            result: None,
        })
    }

    /// Rebuilds a game by re-applying `history` from the configured start.
    /// Clocks come from the recorded entries; moves are not judged late again.
    pub fn replay(
        config: GameConfig,
        started_at: i64,
        history: &[HistoryEntry],
    ) -> Result<Self, ReplayError> {
        let mut state = GameState::new(config, started_at)?;
        for (expected, entry) in history.iter().enumerate() {
            if entry.index != expected {
                return Err(ReplayError::OutOfSequence {
                    expected,
                    found: entry.index,
                });
            }
            if !state.is_playing() {
                return Err(IllegalAction::GameNotPlaying.into());
            }
            if entry.player_id != state.turn {
                return Err(IllegalAction::NotYourTurn(entry.player_id).into());
            }
            state = state.advance(entry.player_id, entry.mv.clone(), entry.timestamp, entry.clocks_ms)?;
        }
        Ok(state)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn pawns(&self) -> &PerPlayer<Pawns> {
        &self.pawns
    }

    pub fn turn(&self) -> PlayerId {
        self.turn
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_playing(&self) -> bool {
        self.status == GameStatus::Playing
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Number of plies played so far.
    pub fn ply(&self) -> usize {
        self.history.len()
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn last_move_time(&self) -> i64 {
        self.last_move_time
    }

    /// Clock values as of the last action, before charging the running clock.
    pub fn clocks_ms(&self) -> PerPlayer<i64> {
        self.clocks_ms
    }

    /// What `player` would have left at `now`.
    pub fn remaining_ms(&self, player: PlayerId, now: i64) -> i64 {
        if self.is_playing() && player == self.turn {
            (self.clocks_ms[player] - (now - self.last_move_time).max(0)).max(0)
        } else {
            self.clocks_ms[player]
        }
    }

    /// The cell `player`'s cat is chasing.
    pub fn goal(&self, player: PlayerId) -> Cell {
        self.pawns[player.other()].mouse
    }

    pub fn routes(&self) -> [Route; 2] {
        routes_for(&self.pawns)
    }

    /// Steps `player`'s cat still needs to reach its goal.
    pub fn cat_distance(&self, player: PlayerId) -> Option<usize> {
        self.grid.distance(self.pawns[player].cat, self.goal(player))
    }

    pub fn legal_walls(&self) -> Vec<Wall> {
        self.grid.legal_walls(&self.routes())
    }

    pub fn can_place_wall(&self, wall: &Wall) -> bool {
        self.grid.can_place_wall(wall, &self.routes())
    }

    /// A copy without history, for cheap speculative search.
    pub(crate) fn scratch(&self) -> GameState {
        GameState {
            config: self.config.clone(),
            grid: self.grid.clone(),
            pawns: self.pawns,
            turn: self.turn,
            clocks_ms: self.clocks_ms,
            started_at: self.started_at,
            last_move_time: self.last_move_time,
            history: Vec::new(),
            status: self.status,
            result: self.result,
        }
    }

    /// Restarts the clock of an untouched game, e.g. when both seats fill.
    pub fn restart_clock(&mut self, now: i64) {
        if self.history.is_empty() && self.is_playing() {
            self.started_at = now;
            self.last_move_time = now;
        }
    }

    /// The single mutation entry point. Returns the successor state; `self`
    /// is left untouched whether or not the action is legal.
    pub fn apply_game_action(&self, action: GameAction) -> Result<GameState, IllegalAction> {
        if !self.is_playing() {
            return Err(IllegalAction::GameNotPlaying);
        }

        let outcome = match action {
            GameAction::Move {
                player_id,
                mv,
                timestamp,
            } => self.apply_move(player_id, mv, timestamp),
            GameAction::Resign {
                player_id,
                timestamp,
            } => {
                let mut next = self.clone();
                next.finish(Some(player_id.other()), ResultReason::Resignation, timestamp);
                Ok(next)
            }
            GameAction::GiveTime {
                player_id,
                seconds,
                timestamp,
            } => {
                if seconds == 0 || seconds > MAX_TIME_GIFT_SECONDS {
                    return Err(IllegalAction::InvalidTimeGift(seconds));
                }
                let mut next = self.clone();
                next.settle_clock(timestamp);
                next.clocks_ms[player_id.other()] += i64::from(seconds) * 1000;
                Ok(next)
            }
            GameAction::TimeoutCheck { timestamp, .. } => {
                if self.remaining_ms(self.turn, timestamp) > 0 {
                    return Err(IllegalAction::ClockNotExpired(self.turn));
                }
                let mut next = self.clone();
                next.finish(Some(self.turn.other()), ResultReason::Timeout, timestamp);
                Ok(next)
            }
            GameAction::AgreeDraw { timestamp, .. } => {
                let mut next = self.clone();
                next.finish(None, ResultReason::DrawAgreement, timestamp);
                Ok(next)
            }
        };

        if let Err(e) = &outcome {
            debug!(error = %e, ply = self.ply(), "Rejected game action");
        }
        outcome
    }

    /// Applies `actions` for `player` ignoring turn, clocks and history.
    /// Used to preview staged actions and to vet premoves.
    pub fn preview(&self, player: PlayerId, actions: &[Action]) -> Result<GameState, IllegalAction> {
        if !self.is_playing() {
            return Err(IllegalAction::GameNotPlaying);
        }
        let mut next = self.clone();
        next.apply_actions(player, actions)?;
        Ok(next)
    }

    /// Ends a game that never got going.
    pub fn abort(&self) -> Result<GameState, IllegalAction> {
        if !self.is_playing() {
            return Err(IllegalAction::GameNotPlaying);
        }
        let mut next = self.clone();
        next.status = GameStatus::Aborted;
        Ok(next)
    }

    /// How many plies a takeback for `requester` removes: back to and
    /// including the requester's most recent ply.
    pub fn takeback_depth(&self, requester: PlayerId) -> Result<usize, IllegalAction> {
        if !self.is_playing() {
            return Err(IllegalAction::GameNotPlaying);
        }
        let depth = if self.turn == requester { 2 } else { 1 };
        if self.history.len() < depth {
            return Err(IllegalAction::NothingToTakeBack);
        }
        Ok(depth)
    }

    /// Truncates history for `requester` and rebuilds the state by replay.
    /// The clock of the player to move restarts at `now`.
    pub fn take_back(&self, requester: PlayerId, now: i64) -> Result<GameState, ReplayError> {
        let depth = self.takeback_depth(requester)?;
        let keep = self.history.len() - depth;
        let mut rebuilt = GameState::replay(self.config.clone(), self.started_at, &self.history[..keep])?;
        rebuilt.last_move_time = now;
        Ok(rebuilt)
    }

    fn apply_move(&self, player: PlayerId, mv: Move, timestamp: i64) -> Result<GameState, IllegalAction> {
        if player != self.turn {
            return Err(IllegalAction::NotYourTurn(player));
        }

        let elapsed = (timestamp - self.last_move_time).max(0);
        if elapsed >= self.clocks_ms[player] {
            let mut flagged = self.clone();
            flagged.finish(Some(player.other()), ResultReason::Timeout, timestamp);
            return Ok(flagged);
        }

        let increment_ms = i64::from(self.config.time_control.increment_seconds) * 1000;
        let mut clocks_ms = self.clocks_ms;
        clocks_ms[player] = self.clocks_ms[player] - elapsed + increment_ms;
        self.advance(player, mv, timestamp, clocks_ms)
    }

    /// Plays `mv` on the board and records it with the given clocks.
    fn advance(&self, player: PlayerId, mv: Move, timestamp: i64, clocks_ms: PerPlayer<i64>) -> Result<GameState, IllegalAction> {
        let mut next = self.clone();
        let capture = next.apply_actions(player, &mv.actions)?;
        next.clocks_ms = clocks_ms;
        next.last_move_time = timestamp;

        let walls_added = mv
            .actions
            .iter()
            .filter(|a| a.kind == ActionKind::Wall)
            .filter_map(|a| a.wall_orientation.map(|o| Wall::new(a.target, o).placed_by(player)))
            .collect();
        next.history.push(HistoryEntry {
            index: self.history.len(),
            player_id: player,
            mv,
            pawns: next.pawns,
            walls_added,
            clocks_ms,
            timestamp,
        });
        next.turn = player.other();

        if let Some(capturer) = capture {
            next.resolve_capture(capturer, timestamp);
        }
        Ok(next)
    }

    /// Applies actions in order; returns the first capture seen.
    fn apply_actions(&mut self, player: PlayerId, actions: &[Action]) -> Result<Option<PlayerId>, IllegalAction> {
        if actions.is_empty() || actions.len() > 2 {
            return Err(IllegalAction::BadActionCount(actions.len()));
        }

        let mut moved: Vec<PawnKind> = Vec::with_capacity(2);
        let mut capture = None;
        for action in actions {
            if let Some(kind) = action.pawn_kind() {
                if moved.contains(&kind) {
                    return Err(IllegalAction::DuplicatePawnMove(kind));
                }
                moved.push(kind);
            }
            self.apply_action(player, action)?;
            if capture.is_none() {
                capture = self.capture();
            }
        }
        Ok(capture)
    }

    fn apply_action(&mut self, player: PlayerId, action: &Action) -> Result<(), IllegalAction> {
        if !self.grid.contains(action.target) {
            return Err(IllegalAction::OutOfBounds(action.target));
        }

        match action.pawn_kind() {
            Some(kind) => {
                if kind == PawnKind::Mouse && self.config.variant == Variant::Classic {
                    return Err(IllegalAction::ImmobileHome);
                }
                let from = self.pawns[player].get(kind);
                if !self.grid.can_step(from, action.target) {
                    return Err(IllegalAction::UnreachableStep {
                        kind,
                        target: action.target,
                    });
                }
                self.pawns[player].set(kind, action.target);
            }
            None => {
                let orientation = action
                    .wall_orientation
                    .ok_or(IllegalAction::MissingWallOrientation)?;
                let routes = self.routes();
                self.grid
                    .place_wall(Wall::new(action.target, orientation).placed_by(player), &routes)?;
            }
        }
        Ok(())
    }

    /// Player 1's capture takes precedence when both happen at once.
    fn capture(&self) -> Option<PlayerId> {
        if self.pawns.p1.cat == self.pawns.p2.mouse {
            Some(PlayerId::One)
        } else if self.pawns.p2.cat == self.pawns.p1.mouse {
            Some(PlayerId::Two)
        } else {
            None
        }
    }

    /// Judged on the position alone: whoever moved, player 1's capture is a
    /// draw while player 2's cat is close enough to answer it.
    fn resolve_capture(&mut self, capturer: PlayerId, timestamp: i64) {
        if capturer == PlayerId::One && self.config.one_move_rule {
            let reply = self.grid.distance(self.pawns.p2.cat, self.pawns.p1.mouse);
            if reply.is_some_and(|d| d <= ONE_MOVE_RULE_REACH) {
                self.finish(None, ResultReason::OneMoveRule, timestamp);
                return;
            }
        }
        self.finish(Some(capturer), ResultReason::Capture, timestamp);
    }

    /// Charges the running clock up to `now`.
    fn settle_clock(&mut self, now: i64) {
        self.clocks_ms[self.turn] = self.remaining_ms(self.turn, now);
        self.last_move_time = self.last_move_time.max(now);
    }

    fn finish(&mut self, winner: Option<PlayerId>, reason: ResultReason, timestamp: i64) {
        self.settle_clock(timestamp);
        self.status = GameStatus::Finished;
        self.result = Some(GameResult { winner, reason });
    }
}

fn routes_for(pawns: &PerPlayer<Pawns>) -> [Route; 2] {
    PlayerId::ALL.map(|player| Route {
        player,
        from: pawns[player].cat,
        to: pawns[player.other()].mouse,
    })
}

// ---- Serialized form ----

/// Wire and archive shape of a [`GameState`]. The grid is carried as its
/// wall list and clocks as seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGameState {
    pub config: GameConfig,
    pub pawns: PerPlayer<Pawns>,
    pub walls: Vec<Wall>,
    pub turn: PlayerId,
    pub clocks: PerPlayer<f64>,
    pub started_at: i64,
    pub last_move_time: i64,
    pub history: Vec<HistoryEntry>,
    pub status: GameStatus,
    #[serde(default)]
    pub result: Option<GameResult>,
}

impl From<GameState> for SerializedGameState {
    fn from(state: GameState) -> Self {
        Self {
            walls: state.grid.walls().copied().collect(),
            config: state.config,
            pawns: state.pawns,
            turn: state.turn,
            clocks: state.clocks_ms.map(|ms| ms as f64 / 1000.0),
            started_at: state.started_at,
            last_move_time: state.last_move_time,
            history: state.history,
            status: state.status,
            result: state.result,
        }
    }
}

impl TryFrom<SerializedGameState> for GameState {
    type Error = ConfigError;

    fn try_from(s: SerializedGameState) -> Result<Self, ConfigError> {
        // Validates dimensions; the current walls replace the initial ones.
        let mut grid = GameConfig {
            initial_walls: Vec::new(),
            initial_pawns: Some(s.pawns),
            ..s.config.clone()
        }
        .initial_grid()?;
        for wall in s.walls {
            grid.insert_wall(wall).map_err(ConfigError::InvalidWall)?;
        }

        Ok(Self {
            config: s.config,
            grid,
            pawns: s.pawns,
            turn: s.turn,
            clocks_ms: s.clocks.map(|secs| (secs * 1000.0).round() as i64),
            started_at: s.started_at,
            last_move_time: s.last_move_time,
            history: s.history,
            status: s.status,
            result: s.result,
        })
    }
}
