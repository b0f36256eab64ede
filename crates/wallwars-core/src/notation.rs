//! Standard move notation.
//!
//! A move is its action tokens joined by `.`, in submission order. Each token
//! is a one-character marker followed by a cell in file-rank form:
//!
//! - `C` / `M`: cat / mouse moves to the cell
//! - `>`: vertical wall on the right side of the cell
//! - `^`: horizontal wall on the top side of the cell
//!
//! Files are letters from `a` (column 0). Ranks count from the bottom row, so
//! rank 1 is row `rows - 1`. On a 5-row board, `Ca5.>b2` moves the cat to the
//! top-left cell and walls the right side of row 3, column 1.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::NotationError;
use crate::types::{Action, ActionKind, Cell, Move, Orientation};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([CM>^])([a-z])([1-9][0-9]?)$").expect("valid regex"));

pub fn cell_to_notation(cell: Cell, rows: usize) -> String {
    let file = (b'a' + cell.col as u8) as char;
    format!("{file}{}", rows - cell.row)
}

pub fn cell_from_notation(file: char, rank: usize, rows: usize) -> Result<Cell, NotationError> {
    if !file.is_ascii_lowercase() || rank == 0 || rank > rows {
        return Err(NotationError::CellOutOfRange(format!("{file}{rank}")));
    }
    Ok(Cell::new(rows - rank, (file as u8 - b'a') as usize))
}

pub fn action_to_notation(action: &Action, rows: usize) -> String {
    let marker = match (action.kind, action.wall_orientation) {
        (ActionKind::CatMove, _) => 'C',
        (ActionKind::MouseMove, _) => 'M',
        (ActionKind::Wall, Some(Orientation::Horizontal)) => '^',
        (ActionKind::Wall, _) => '>',
    };
    format!("{marker}{}", cell_to_notation(action.target, rows))
}

pub fn move_to_standard_notation(mv: &Move, rows: usize) -> String {
    mv.actions
        .iter()
        .map(|a| action_to_notation(a, rows))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn action_from_notation(token: &str, rows: usize) -> Result<Action, NotationError> {
    let caps = TOKEN_RE
        .captures(token)
        .ok_or_else(|| NotationError::InvalidToken(token.to_string()))?;

    let file = caps[2].chars().next().unwrap_or('a');
    let rank: usize = caps[3]
        .parse()
        .map_err(|_| NotationError::InvalidToken(token.to_string()))?;
    let cell = cell_from_notation(file, rank, rows)?;

    Ok(match &caps[1] {
        "C" => Action::cat(cell),
        "M" => Action::mouse(cell),
        "^" => Action::wall(cell, Orientation::Horizontal),
        _ => Action::wall(cell, Orientation::Vertical),
    })
}

pub fn move_from_standard_notation(notation: &str, rows: usize) -> Result<Move, NotationError> {
    let notation = notation.trim();
    if notation.is_empty() {
        return Err(NotationError::Empty);
    }

    let actions = notation
        .split('.')
        .map(|token| action_from_notation(token, rows))
        .collect::<Result<Vec<_>, _>>()?;
    if actions.len() > 2 {
        return Err(NotationError::TooManyActions(actions.len()));
    }
    Ok(Move::new(actions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_notation_counts_ranks_from_bottom() {
        assert_eq!(cell_to_notation(Cell::new(4, 0), 5), "a1");
        assert_eq!(cell_to_notation(Cell::new(0, 2), 5), "c5");
        assert_eq!(cell_to_notation(Cell::new(0, 0), 12), "a12");
    }

    #[test]
    fn test_move_round_trip_keeps_order() {
        let mv = Move::new(vec![
            Action::wall(Cell::new(2, 1), Orientation::Vertical),
            Action::cat(Cell::new(0, 0)),
        ]);
        let text = move_to_standard_notation(&mv, 5);
        assert_eq!(text, ">b3.Ca5");
        assert_eq!(move_from_standard_notation(&text, 5).unwrap(), mv);
    }

    #[test]
    fn test_round_trip_all_kinds() {
        for rows in [3, 8, 16] {
            let mv = Move::new(vec![
                Action::mouse(Cell::new(rows - 1, 2)),
                Action::wall(Cell::new(1, 0), Orientation::Horizontal),
            ]);
            let text = move_to_standard_notation(&mv, rows);
            assert_eq!(move_from_standard_notation(&text, rows).unwrap(), mv);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(move_from_standard_notation("", 5), Err(NotationError::Empty));
        assert!(matches!(
            move_from_standard_notation("Xa1", 5),
            Err(NotationError::InvalidToken(_))
        ));
        assert!(matches!(
            move_from_standard_notation("Ca6", 5),
            Err(NotationError::CellOutOfRange(_))
        ));
        assert_eq!(
            move_from_standard_notation("Ca1.Mb1.>c2", 5),
            Err(NotationError::TooManyActions(3))
        );
    }
}
