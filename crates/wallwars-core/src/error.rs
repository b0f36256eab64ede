//! Rules engine error types

use thiserror::Error;

use crate::types::{Cell, Orientation, PawnKind, PlayerId};

/// An action that violates the rules. Never mutates state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IllegalAction {
    #[error("Game is not in progress")]
    GameNotPlaying,

    #[error("It is not player {0}'s turn")]
    NotYourTurn(PlayerId),

    #[error("A move must contain one or two actions, got {0}")]
    BadActionCount(usize),

    #[error("A move may move the {0} only once")]
    DuplicatePawnMove(PawnKind),

    #[error("Cell {0} is outside the board")]
    OutOfBounds(Cell),

    #[error("The {kind} cannot reach {target} in one step")]
    UnreachableStep { kind: PawnKind, target: Cell },

    #[error("The home marker cannot move in the classic variant")]
    ImmobileHome,

    #[error("Wall action is missing an orientation")]
    MissingWallOrientation,

    #[error("No wall slot {orientation:?} at {cell}")]
    InvalidWallSlot { cell: Cell, orientation: Orientation },

    #[error("Wall slot {orientation:?} at {cell} is already occupied")]
    WallSlotOccupied { cell: Cell, orientation: Orientation },

    #[error("Wall would cut player {0}'s cat off from its goal")]
    WallSealsPath(PlayerId),

    #[error("Player {0}'s clock has not run out")]
    ClockNotExpired(PlayerId),

    #[error("Cannot give {0} seconds")]
    InvalidTimeGift(u32),

    #[error("Nothing to take back")]
    NothingToTakeBack,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    #[error("Empty move notation")]
    Empty,

    #[error("Invalid notation token '{0}'")]
    InvalidToken(String),

    #[error("Cell '{0}' is outside the board")]
    CellOutOfRange(String),

    #[error("A move has at most two actions, got {0}")]
    TooManyActions(usize),
}

/// A match configuration that cannot produce a playable board.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Board must be between {min}x{min} and {max}x{max}, got {width}x{height}")]
    InvalidDimensions {
        width: usize,
        height: usize,
        min: usize,
        max: usize,
    },

    #[error("Initial pawn at {0} is outside the board")]
    PawnOutOfBounds(Cell),

    #[error("Invalid initial wall: {0}")]
    InvalidWall(IllegalAction),

    #[error("Time control must give each player some time")]
    InvalidTimeControl,
}

/// Rebuilding a state from history failed, or there was nothing to rebuild.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Illegal(#[from] IllegalAction),

    #[error("History entry {found} is out of sequence, expected {expected}")]
    OutOfSequence { expected: usize, found: usize },
}
