//! Board vocabulary shared by the engine, the wire protocol and the bots.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---- Players ----

/// One of the two seats. Serialized as the bare number `1` or `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlayerId {
    One,
    Two,
}

impl PlayerId {
    pub const ALL: [PlayerId; 2] = [PlayerId::One, PlayerId::Two];

    pub fn other(self) -> PlayerId {
        match self {
            PlayerId::One => PlayerId::Two,
            PlayerId::Two => PlayerId::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            PlayerId::One => 1,
            PlayerId::Two => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<PlayerId> {
        match n {
            1 => Some(PlayerId::One),
            2 => Some(PlayerId::Two),
            _ => None,
        }
    }

    /// Player who owns ply `index`. Player 1 always moves first.
    pub fn for_ply(index: usize) -> PlayerId {
        if index % 2 == 0 {
            PlayerId::One
        } else {
            PlayerId::Two
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        PlayerId::from_number(n)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid player id {n}")))
    }
}

/// A value held once per player, serialized as `{"1": .., "2": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PerPlayer<T> {
    #[serde(rename = "1")]
    pub p1: T,
    #[serde(rename = "2")]
    pub p2: T,
}

impl<T> PerPlayer<T> {
    pub fn new(p1: T, p2: T) -> Self {
        Self { p1, p2 }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PerPlayer<U> {
        PerPlayer {
            p1: f(self.p1),
            p2: f(self.p2),
        }
    }
}

impl<T> Index<PlayerId> for PerPlayer<T> {
    type Output = T;

    fn index(&self, player: PlayerId) -> &T {
        match player {
            PlayerId::One => &self.p1,
            PlayerId::Two => &self.p2,
        }
    }
}

impl<T> IndexMut<PlayerId> for PerPlayer<T> {
    fn index_mut(&mut self, player: PlayerId) -> &mut T {
        match player {
            PlayerId::One => &mut self.p1,
            PlayerId::Two => &mut self.p2,
        }
    }
}

// ---- Geometry ----

/// A board cell. Row 0 is the top row. Serialized as `[row, col]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// The neighbouring cell in `dir`, if it stays on a `width` x `height` board.
    pub fn step(self, dir: Direction, width: usize, height: usize) -> Option<Cell> {
        let (row, col) = match dir {
            Direction::Up => (self.row.checked_sub(1)?, self.col),
            Direction::Down => (self.row + 1, self.col),
            Direction::Left => (self.row, self.col.checked_sub(1)?),
            Direction::Right => (self.row, self.col + 1),
        };
        (row < height && col < width).then_some(Cell { row, col })
    }

    /// Direction from `self` to an orthogonally adjacent `other`.
    pub fn direction_to(self, other: Cell) -> Option<Direction> {
        match (
            other.row as isize - self.row as isize,
            other.col as isize - self.col as isize,
        ) {
            (-1, 0) => Some(Direction::Up),
            (1, 0) => Some(Direction::Down),
            (0, -1) => Some(Direction::Left),
            (0, 1) => Some(Direction::Right),
            _ => None,
        }
    }
}

impl From<[usize; 2]> for Cell {
    fn from([row, col]: [usize; 2]) -> Self {
        Cell { row, col }
    }
}

impl From<Cell> for [usize; 2] {
    fn from(cell: Cell) -> Self {
        [cell.row, cell.col]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A unit wall.
///
/// A vertical wall at `cell` separates `cell` from its right neighbour. A
/// horizontal wall at `cell` sits above it and separates `cell` from the cell
/// one row up. The placing player is only carried for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wall {
    pub cell: Cell,
    pub orientation: Orientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

impl Wall {
    pub fn new(cell: Cell, orientation: Orientation) -> Self {
        Self {
            cell,
            orientation,
            player_id: None,
        }
    }

    pub fn placed_by(mut self, player: PlayerId) -> Self {
        self.player_id = Some(player);
        self
    }

    /// Position + orientation, ignoring who placed it.
    pub fn slot(&self) -> (Cell, Orientation) {
        (self.cell, self.orientation)
    }
}

// ---- Pawns and variants ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The mouse is an immobile home marker.
    Classic,
    #[default]
    Standard,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Classic => write!(f, "classic"),
            Variant::Standard => write!(f, "standard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PawnKind {
    Cat,
    Mouse,
}

impl fmt::Display for PawnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PawnKind::Cat => write!(f, "cat"),
            PawnKind::Mouse => write!(f, "mouse"),
        }
    }
}

/// One player's two pawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pawns {
    pub cat: Cell,
    pub mouse: Cell,
}

impl Pawns {
    pub fn get(&self, kind: PawnKind) -> Cell {
        match kind {
            PawnKind::Cat => self.cat,
            PawnKind::Mouse => self.mouse,
        }
    }

    pub fn set(&mut self, kind: PawnKind, cell: Cell) {
        match kind {
            PawnKind::Cat => self.cat = cell,
            PawnKind::Mouse => self.mouse = cell,
        }
    }
}

// ---- Actions ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    CatMove,
    MouseMove,
    Wall,
}

/// A single sub-unit of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub target: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_orientation: Option<Orientation>,
}

impl Action {
    pub fn cat(target: Cell) -> Self {
        Self {
            kind: ActionKind::CatMove,
            target,
            wall_orientation: None,
        }
    }

    pub fn mouse(target: Cell) -> Self {
        Self {
            kind: ActionKind::MouseMove,
            target,
            wall_orientation: None,
        }
    }

    pub fn wall(target: Cell, orientation: Orientation) -> Self {
        Self {
            kind: ActionKind::Wall,
            target,
            wall_orientation: Some(orientation),
        }
    }

    pub fn pawn_kind(&self) -> Option<PawnKind> {
        match self.kind {
            ActionKind::CatMove => Some(PawnKind::Cat),
            ActionKind::MouseMove => Some(PawnKind::Mouse),
            ActionKind::Wall => None,
        }
    }
}

/// The 1-2 actions a player submits for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Move {
    pub actions: Vec<Action>,
}

impl Move {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl From<Vec<Action>> for Move {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}
