//! Wall occupancy and path queries over the rectangular board.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::error::IllegalAction;
use crate::types::{Cell, Direction, Orientation, PlayerId, Wall};

/// A cat's path to its goal that every wall placement must keep open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub player: PlayerId,
    pub from: Cell,
    pub to: Cell,
}

type Slot = (Cell, Orientation);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    walls: BTreeMap<Slot, Wall>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            walls: BTreeMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.row < self.height && cell.col < self.width
    }

    /// Walls in slot order, which makes serialization deterministic.
    pub fn walls(&self) -> impl Iterator<Item = &Wall> {
        self.walls.values()
    }

    pub fn wall_count(&self) -> usize {
        self.walls.len()
    }

    pub fn has_wall(&self, cell: Cell, orientation: Orientation) -> bool {
        self.walls.contains_key(&(cell, orientation))
    }

    /// Whether a wall may exist at this slot at all. Walls on the outer
    /// boundary would separate nothing.
    pub fn is_valid_slot(&self, cell: Cell, orientation: Orientation) -> bool {
        self.contains(cell)
            && match orientation {
                Orientation::Vertical => cell.col + 1 < self.width,
                Orientation::Horizontal => cell.row >= 1,
            }
    }

    pub fn is_blocked(&self, cell: Cell, dir: Direction) -> bool {
        match edge_slot(cell, dir) {
            Some(slot) => self.walls.contains_key(&slot),
            None => true,
        }
    }

    /// Whether a pawn can move from `from` to `to` in one step.
    pub fn can_step(&self, from: Cell, to: Cell) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        match from.direction_to(to) {
            Some(dir) => !self.is_blocked(from, dir),
            None => false,
        }
    }

    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        Direction::ALL.into_iter().filter_map(move |dir| {
            let next = cell.step(dir, self.width, self.height)?;
            (!self.is_blocked(cell, dir)).then_some(next)
        })
    }

    /// Shortest number of steps from `from` to `to`, or `None` when walled off.
    pub fn distance(&self, from: Cell, to: Cell) -> Option<usize> {
        self.bfs(from, to, None)
    }

    fn bfs(&self, from: Cell, to: Cell, extra: Option<Slot>) -> Option<usize> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(0);
        }

        let mut dist = vec![usize::MAX; self.width * self.height];
        let mut queue = VecDeque::new();
        dist[self.index(from)] = 0;
        queue.push_back(from);

        while let Some(cell) = queue.pop_front() {
            let d = dist[self.index(cell)];
            for dir in Direction::ALL {
                let Some(next) = cell.step(dir, self.width, self.height) else {
                    continue;
                };
                let Some(slot) = edge_slot(cell, dir) else {
                    continue;
                };
                if self.walls.contains_key(&slot) || extra == Some(slot) {
                    continue;
                }
                let idx = self.index(next);
                if dist[idx] != usize::MAX {
                    continue;
                }
                if next == to {
                    return Some(d + 1);
                }
                dist[idx] = d + 1;
                queue.push_back(next);
            }
        }

        None
    }

    /// Checks a placement against slot validity, occupancy and every route.
    pub fn check_wall(&self, wall: &Wall, routes: &[Route]) -> Result<(), IllegalAction> {
        let (cell, orientation) = wall.slot();
        if !self.is_valid_slot(cell, orientation) {
            return Err(IllegalAction::InvalidWallSlot { cell, orientation });
        }
        if self.has_wall(cell, orientation) {
            return Err(IllegalAction::WallSlotOccupied { cell, orientation });
        }
        for route in routes {
            if self.bfs(route.from, route.to, Some(wall.slot())).is_none() {
                return Err(IllegalAction::WallSealsPath(route.player));
            }
        }
        Ok(())
    }

    pub fn can_place_wall(&self, wall: &Wall, routes: &[Route]) -> bool {
        self.check_wall(wall, routes).is_ok()
    }

    pub fn place_wall(&mut self, wall: Wall, routes: &[Route]) -> Result<(), IllegalAction> {
        self.check_wall(&wall, routes)?;
        self.walls.insert(wall.slot(), wall);
        Ok(())
    }

    /// Inserts without the connectivity check. Used when restoring a board
    /// that was already validated.
    pub(crate) fn insert_wall(&mut self, wall: Wall) -> Result<(), IllegalAction> {
        self.check_wall(&wall, &[])?;
        self.walls.insert(wall.slot(), wall);
        Ok(())
    }

    /// Every wall that could be placed right now without cutting a route.
    ///
    /// Instead of one BFS per candidate, finds the bridges separating each
    /// route's endpoints once; a wall is illegal exactly when it removes one.
    pub fn legal_walls(&self, routes: &[Route]) -> Vec<Wall> {
        let mut cut_edges = HashSet::new();
        for route in routes {
            cut_edges.extend(self.separating_bridges(route.from, route.to));
        }

        let mut legal = Vec::new();
        for row in 0..self.height {
            for col in 0..self.width {
                let cell = Cell::new(row, col);
                for orientation in [Orientation::Vertical, Orientation::Horizontal] {
                    if !self.is_valid_slot(cell, orientation) || self.has_wall(cell, orientation) {
                        continue;
                    }
                    if cut_edges.contains(&slot_edge(cell, orientation)) {
                        continue;
                    }
                    legal.push(Wall::new(cell, orientation));
                }
            }
        }
        legal
    }

    /// Bridges whose removal disconnects `from` from `to`.
    fn separating_bridges(&self, from: Cell, to: Cell) -> HashSet<(Cell, Cell)> {
        let mut search = BridgeSearch {
            grid: self,
            disc: vec![None; self.width * self.height],
            low: vec![0; self.width * self.height],
            timer: 0,
            target: to,
            bridges: HashSet::new(),
        };
        if self.contains(from) && self.contains(to) {
            search.visit(from, None);
        }
        search.bridges
    }

    fn index(&self, cell: Cell) -> usize {
        cell.row * self.width + cell.col
    }
}

/// Tarjan's bridge search, keeping only bridges on the path to `target`.
struct BridgeSearch<'a> {
    grid: &'a Grid,
    disc: Vec<Option<usize>>,
    low: Vec<usize>,
    timer: usize,
    target: Cell,
    bridges: HashSet<(Cell, Cell)>,
}

impl BridgeSearch<'_> {
    /// Returns whether the DFS subtree rooted at `cell` contains the target.
    fn visit(&mut self, cell: Cell, parent: Option<Cell>) -> bool {
        let u = self.grid.index(cell);
        self.disc[u] = Some(self.timer);
        self.low[u] = self.timer;
        self.timer += 1;

        let mut has_target = cell == self.target;
        let neighbors: Vec<Cell> = self.grid.neighbors(cell).collect();
        for next in neighbors {
            if Some(next) == parent {
                continue;
            }
            let v = self.grid.index(next);
            match self.disc[v] {
                Some(d) => self.low[u] = self.low[u].min(d),
                None => {
                    let reaches_target = self.visit(next, Some(cell));
                    self.low[u] = self.low[u].min(self.low[v]);
                    if reaches_target {
                        has_target = true;
                        if self.disc[u].is_some_and(|du| self.low[v] > du) {
                            self.bridges.insert(ordered(cell, next));
                        }
                    }
                }
            }
        }
        has_target
    }
}

/// The wall slot that would block leaving `cell` towards `dir`.
fn edge_slot(cell: Cell, dir: Direction) -> Option<Slot> {
    match dir {
        Direction::Right => Some((cell, Orientation::Vertical)),
        Direction::Left => Some((Cell::new(cell.row, cell.col.checked_sub(1)?), Orientation::Vertical)),
        Direction::Up => Some((cell, Orientation::Horizontal)),
        Direction::Down => Some((Cell::new(cell.row + 1, cell.col), Orientation::Horizontal)),
    }
}

/// The pair of cells a wall slot separates.
fn slot_edge(cell: Cell, orientation: Orientation) -> (Cell, Cell) {
    match orientation {
        Orientation::Vertical => (cell, Cell::new(cell.row, cell.col + 1)),
        Orientation::Horizontal => (Cell::new(cell.row - 1, cell.col), cell),
    }
}

fn ordered(a: Cell, b: Cell) -> (Cell, Cell) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
