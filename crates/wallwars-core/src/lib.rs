//! Rules engine for wallwars: a two-player cat-and-mouse pursuit game played
//! on a walled grid.
//!
//! Everything in this crate is pure and synchronous. The server owns the
//! canonical [`state::GameState`] and feeds it [`state::GameAction`]s; clients
//! use [`staging::ActionStager`] to build moves against read-only snapshots.

pub mod ai;
pub mod error;
pub mod grid;
pub mod notation;
pub mod staging;
pub mod state;
pub mod types;

pub use error::{ConfigError, IllegalAction, NotationError, ReplayError};
pub use grid::Grid;
pub use state::{GameAction, GameConfig, GameResult, GameState, GameStatus, HistoryEntry, ResultReason};
pub use types::{Action, ActionKind, Cell, Move, Orientation, Pawns, PerPlayer, PlayerId, Variant, Wall};
