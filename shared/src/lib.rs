//! Types shared by the snake server and its clients: board coordinates,
//! moves, squares, colors and the binary wire protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod protocol;

pub const DEFAULT_PORT: u16 = 42069;

/// Longest display name the server keeps, in characters.
pub const MAX_NAME_LEN: usize = 15;

/// One of the four cardinal directions, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Move {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Move> {
        Move::ALL.get(index as usize).copied()
    }

    /// Row and column offset of a single step.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Move::Up => (-1, 0),
            Move::Right => (0, 1),
            Move::Down => (1, 0),
            Move::Left => (0, -1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction `{0}`")]
pub struct ParseMoveError(pub String);

impl FromStr for Move {
    type Err = ParseMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "u" | "north" | "n" => Ok(Move::Up),
            "down" | "d" | "south" | "s" => Ok(Move::Down),
            "left" | "l" | "west" | "w" => Ok(Move::Left),
            "right" | "r" | "east" | "e" => Ok(Move::Right),
            _ => Err(ParseMoveError(s.to_string())),
        }
    }
}

/// A board cell. Rows grow downwards, columns grow to the right.
///
/// Ordering is row-major so sets of positions iterate the way the grid is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub row: i32,
    pub col: i32,
}

impl Pos {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub fn moved(self, mv: Move) -> Pos {
        let (dr, dc) = mv.delta();
        Pos::new(self.row + dr, self.col + dc)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Square {
    Empty,
    Food,
    Snake(u32),
}

impl Square {
    pub const EMPTY_TAG: u8 = 0;
    pub const FOOD_TAG: u8 = 1;
    pub const SNAKE_TAG: u8 = 2;

    /// Empty and food squares can be entered; snake bodies cannot.
    pub fn can_move_to(self) -> bool {
        matches!(self, Square::Empty | Square::Food)
    }

    pub fn tag(self) -> u8 {
        match self {
            Square::Empty => Self::EMPTY_TAG,
            Square::Food => Self::FOOD_TAG,
            Square::Snake(_) => Self::SNAKE_TAG,
        }
    }

    pub fn owner(self) -> Option<u32> {
        match self {
            Square::Snake(id) => Some(id),
            _ => None,
        }
    }

    pub fn from_tag(tag: u8, owner: u32) -> Option<Square> {
        match tag {
            Self::EMPTY_TAG => Some(Square::Empty),
            Self::FOOD_TAG => Some(Square::Food),
            Self::SNAKE_TAG => Some(Square::Snake(owner)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Manhattan distance in RGB space.
    pub fn distance(self, other: Color) -> u32 {
        let d = |a: u8, b: u8| (a as i32 - b as i32).unsigned_abs();
        d(self.r, other.r) + d(self.g, other.g) + d(self.b, other.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a color as `r,g,b`, got `{0}`")]
pub struct ParseColorError(pub String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u8> = s
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| ParseColorError(s.to_string()))?;

        match parts.as_slice() {
            [r, g, b] => Ok(Color::new(*r, *g, *b)),
            _ => Err(ParseColorError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_index_roundtrip() {
        for mv in Move::ALL {
            assert_eq!(Move::from_index(mv.index()), Some(mv));
        }
        assert_eq!(Move::from_index(4), None);
        assert_eq!(Move::from_index(255), None);
    }

    #[test]
    fn test_move_aliases() {
        assert_eq!("UP".parse::<Move>(), Ok(Move::Up));
        assert_eq!("n".parse::<Move>(), Ok(Move::Up));
        assert_eq!("South".parse::<Move>(), Ok(Move::Down));
        assert_eq!("w".parse::<Move>(), Ok(Move::Left));
        assert_eq!("east".parse::<Move>(), Ok(Move::Right));
        assert!("sideways".parse::<Move>().is_err());
    }

    #[test]
    fn test_pos_moved() {
        let pos = Pos::new(3, 4);
        assert_eq!(pos.moved(Move::Up), Pos::new(2, 4));
        assert_eq!(pos.moved(Move::Right), Pos::new(3, 5));
        assert_eq!(pos.moved(Move::Down), Pos::new(4, 4));
        assert_eq!(pos.moved(Move::Left), Pos::new(3, 3));
        assert_eq!(Pos::new(0, 0).moved(Move::Up), Pos::new(-1, 0));
    }

    #[test]
    fn test_pos_ordering_is_row_major() {
        let mut cells = vec![Pos::new(1, 0), Pos::new(0, 5), Pos::new(0, 1)];
        cells.sort();
        assert_eq!(cells, vec![Pos::new(0, 1), Pos::new(0, 5), Pos::new(1, 0)]);
    }

    #[test]
    fn test_square_tags() {
        assert!(Square::Empty.can_move_to());
        assert!(Square::Food.can_move_to());
        assert!(!Square::Snake(2).can_move_to());
        assert_eq!(Square::from_tag(2, 7), Some(Square::Snake(7)));
        assert_eq!(Square::from_tag(1, 7), Some(Square::Food));
        assert_eq!(Square::from_tag(3, 0), None);
    }

    #[test]
    fn test_color_distance_and_parse() {
        let background = Color::new(26, 26, 26);
        assert_eq!(background.distance(Color::new(36, 16, 26)), 20);
        assert_eq!("10, 20,30".parse::<Color>(), Ok(Color::new(10, 20, 30)));
        assert!("10,20".parse::<Color>().is_err());
        assert!("10,20,300".parse::<Color>().is_err());
    }
}
