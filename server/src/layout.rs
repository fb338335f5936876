//! Board layouts: dimensions, food target and starting snake bodies.

use crate::error::LayoutError;
use serde::Deserialize;
use shared::{Move, Pos};
use std::collections::HashSet;
use std::path::Path;

/// Starting body of one snake: the tail cell plus the steps toward the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnakeStart {
    pub back: Pos,
    pub body: Vec<Move>,
}

impl SnakeStart {
    pub fn new(back: Pos, body: Vec<Move>) -> Self {
        Self { back, body }
    }

    /// Every cell of the body, tail first.
    pub fn cells(&self) -> Vec<Pos> {
        let mut cells = Vec::with_capacity(self.body.len() + 1);
        let mut pos = self.back;
        cells.push(pos);
        for mv in &self.body {
            pos = pos.moved(*mv);
            cells.push(pos);
        }
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub num_rows: u32,
    pub num_cols: u32,
    pub num_food: usize,
    pub snakes: Vec<SnakeStart>,
}

#[derive(Deserialize)]
struct LayoutFile {
    num_rows: u32,
    num_cols: u32,
    num_food: usize,
    snakes: Vec<SnakeFile>,
}

#[derive(Deserialize)]
struct SnakeFile {
    back: (i32, i32),
    body: Vec<String>,
}

impl Layout {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, LayoutError> {
        let file: LayoutFile = serde_json::from_str(text)?;

        let snakes = file
            .snakes
            .into_iter()
            .map(|snake| -> Result<SnakeStart, LayoutError> {
                let body = snake
                    .body
                    .iter()
                    .map(|token| token.parse::<Move>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SnakeStart::new(Pos::new(snake.back.0, snake.back.1), body))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let layout = Layout {
            num_rows: file.num_rows,
            num_cols: file.num_cols,
            num_food: file.num_food,
            snakes,
        };
        layout.validate()?;

        Ok(layout)
    }

    /// Checks that every snake fits on the board without touching another.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.num_rows == 0 || self.num_cols == 0 {
            return Err(LayoutError::EmptyBoard);
        }
        if self.snakes.is_empty() {
            return Err(LayoutError::NoSnakes);
        }

        let mut taken = HashSet::new();
        for (snake, start) in self.snakes.iter().enumerate() {
            for pos in start.cells() {
                if !self.contains(pos) {
                    return Err(LayoutError::OutOfBounds { snake, pos });
                }
                if !taken.insert(pos) {
                    return Err(LayoutError::Overlap { snake, pos });
                }
            }
        }

        Ok(())
    }

    fn contains(&self, pos: Pos) -> bool {
        pos.row >= 0 && pos.col >= 0 && (pos.row as u32) < self.num_rows && (pos.col as u32) < self.num_cols
    }

    pub fn num_snakes(&self) -> usize {
        self.snakes.len()
    }
}

impl Default for Layout {
    /// 20x20 board with a length-3 snake near each corner, all heading clockwise.
    fn default() -> Self {
        Layout {
            num_rows: 20,
            num_cols: 20,
            num_food: 5,
            snakes: vec![
                SnakeStart::new(Pos::new(2, 2), vec![Move::Right, Move::Right]),
                SnakeStart::new(Pos::new(2, 17), vec![Move::Down, Move::Down]),
                SnakeStart::new(Pos::new(17, 17), vec![Move::Left, Move::Left]),
                SnakeStart::new(Pos::new(17, 2), vec![Move::Up, Move::Up]),
            ],
        }
    }
}
