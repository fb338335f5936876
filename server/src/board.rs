//! Dense row-major grid of squares with change tracking.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Pos, Square};
use std::collections::{BTreeMap, BTreeSet};

/// Cells that changed since the previous broadcast, and the turn they lead to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changes {
    pub squares: BTreeMap<Pos, Square>,
    pub new_turn: u32,
}

#[derive(Debug, Clone)]
pub struct Board {
    num_rows: u32,
    num_cols: u32,
    squares: Vec<Square>,
    dirty: BTreeSet<Pos>,
}

impl Board {
    pub fn new(num_rows: u32, num_cols: u32) -> Self {
        Self {
            num_rows,
            num_cols,
            squares: vec![Square::Empty; num_rows as usize * num_cols as usize],
            dirty: BTreeSet::new(),
        }
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_cols(&self) -> u32 {
        self.num_cols
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.row >= 0 && pos.col >= 0 && (pos.row as u32) < self.num_rows && (pos.col as u32) < self.num_cols
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| pos.row as usize * self.num_cols as usize + pos.col as usize)
    }

    /// Returns `None` outside the board.
    pub fn get(&self, pos: Pos) -> Option<Square> {
        self.index(pos).map(|i| self.squares[i])
    }

    /// True when `pos` is on the board and can be entered.
    pub fn is_free(&self, pos: Pos) -> bool {
        self.get(pos).is_some_and(Square::can_move_to)
    }

    /// Writes a square and records the cell as changed. Returns the previous value.
    pub fn set(&mut self, pos: Pos, square: Square) -> Option<Square> {
        let index = self.index(pos)?;
        self.dirty.insert(pos);
        Some(std::mem::replace(&mut self.squares[index], square))
    }

    /// All squares in row-major order.
    pub fn squares(&self) -> &[Square] {
        &self.squares
    }

    pub fn positions(&self) -> impl Iterator<Item = Pos> + '_ {
        (0..self.num_rows as i32).flat_map(move |row| (0..self.num_cols as i32).map(move |col| Pos::new(row, col)))
    }

    pub fn count(&self, square: Square) -> usize {
        self.squares.iter().filter(|s| **s == square).count()
    }

    /// Drains the dirty set into a diff carrying the current square of every touched cell.
    pub fn take_changes(&mut self, new_turn: u32) -> Changes {
        let dirty = std::mem::take(&mut self.dirty);
        let squares = dirty
            .into_iter()
            .filter_map(|pos| self.get(pos).map(|square| (pos, square)))
            .collect();

        Changes { squares, new_turn }
    }

    /// Tops food back up to `target`, choosing uniformly among empty cells.
    pub fn replenish_food<R: Rng>(&mut self, target: usize, rng: &mut R) {
        let current = self.count(Square::Food);
        if current >= target {
            return;
        }

        let mut empty: Vec<Pos> = self
            .positions()
            .filter(|pos| self.get(*pos) == Some(Square::Empty))
            .collect();
        if empty.is_empty() {
            return;
        }

        let missing = target - current;
        if missing == 1 {
            let pos = empty[rng.gen_range(0..empty.len())];
            self.set(pos, Square::Food);
        } else {
            empty.shuffle(rng);
            for pos in empty.into_iter().take(missing) {
                self.set(pos, Square::Food);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounds() {
        let board = Board::new(3, 5);
        assert!(board.in_bounds(Pos::new(0, 0)));
        assert!(board.in_bounds(Pos::new(2, 4)));
        assert!(!board.in_bounds(Pos::new(3, 0)));
        assert!(!board.in_bounds(Pos::new(0, 5)));
        assert!(!board.in_bounds(Pos::new(-1, 2)));
        assert_eq!(board.get(Pos::new(0, -1)), None);
    }

    #[test]
    fn test_set_tracks_changes() {
        let mut board = Board::new(4, 4);
        assert_eq!(board.set(Pos::new(1, 1), Square::Food), Some(Square::Empty));
        assert_eq!(board.set(Pos::new(0, 3), Square::Snake(2)), Some(Square::Empty));
        assert_eq!(board.set(Pos::new(1, 1), Square::Empty), Some(Square::Food));
        assert_eq!(board.set(Pos::new(9, 9), Square::Food), None);

        let changes = board.take_changes(5);
        assert_eq!(changes.new_turn, 5);
        let listed: Vec<_> = changes.squares.into_iter().collect();
        assert_eq!(
            listed,
            vec![(Pos::new(0, 3), Square::Snake(2)), (Pos::new(1, 1), Square::Empty)]
        );

        assert!(board.take_changes(6).squares.is_empty());
    }

    #[test]
    fn test_replenish_food_fills_to_target() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut board = Board::new(5, 5);
        board.set(Pos::new(0, 0), Square::Snake(0));

        board.replenish_food(4, &mut rng);
        assert_eq!(board.count(Square::Food), 4);
        assert_eq!(board.get(Pos::new(0, 0)), Some(Square::Snake(0)));

        let eaten = board.positions().find(|p| board.get(*p) == Some(Square::Food)).unwrap();
        board.set(eaten, Square::Empty);
        board.replenish_food(4, &mut rng);
        assert_eq!(board.count(Square::Food), 4);
    }

    #[test]
    fn test_replenish_food_stops_when_board_is_full() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut board = Board::new(1, 3);
        board.set(Pos::new(0, 0), Square::Snake(0));
        board.set(Pos::new(0, 1), Square::Snake(0));

        board.replenish_food(5, &mut rng);
        assert_eq!(board.count(Square::Food), 1);
        assert_eq!(board.get(Pos::new(0, 2)), Some(Square::Food));
    }
}
