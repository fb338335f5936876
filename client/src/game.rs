use log::{debug, warn};
use shared::protocol::GameResults;
use shared::{Pos, Square};

/// The client's mirror of the match it is playing, rebuilt from server diffs.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    num_rows: u32,
    num_cols: u32,
    snake_id: u32,
    squares: Vec<Square>,
    head: Option<Pos>,
    turn: u32,
    alive: bool,
    in_game: bool,
    last_results: Option<GameResults>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the mirror for a new match.
    pub fn start(&mut self, num_rows: u32, num_cols: u32, snake_id: u32) {
        debug!("Match started on {}x{} board as snake {}", num_rows, num_cols, snake_id);
        self.num_rows = num_rows;
        self.num_cols = num_cols;
        self.snake_id = snake_id;
        self.squares = vec![Square::Empty; num_rows as usize * num_cols as usize];
        self.head = None;
        self.turn = 0;
        self.alive = true;
        self.in_game = true;
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_cols(&self) -> u32 {
        self.num_cols
    }

    pub fn snake_id(&self) -> u32 {
        self.snake_id
    }

    pub fn head(&self) -> Option<Pos> {
        self.head
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn last_results(&self) -> Option<&GameResults> {
        self.last_results.as_ref()
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        let in_bounds =
            pos.row >= 0 && pos.col >= 0 && (pos.row as u32) < self.num_rows && (pos.col as u32) < self.num_cols;
        in_bounds.then(|| pos.row as usize * self.num_cols as usize + pos.col as usize)
    }

    pub fn get(&self, pos: Pos) -> Option<Square> {
        self.index(pos).map(|i| self.squares[i])
    }

    /// On the board and not part of any snake.
    pub fn is_free(&self, pos: Pos) -> bool {
        self.get(pos).is_some_and(Square::can_move_to)
    }

    pub fn food(&self) -> impl Iterator<Item = Pos> + '_ {
        let cols = self.num_cols.max(1) as usize;
        self.squares
            .iter()
            .enumerate()
            .filter(|(_, square)| **square == Square::Food)
            .map(move |(i, _)| Pos::new((i / cols) as i32, (i % cols) as i32))
    }

    /// Applies a GAME_CHANGES diff.
    pub fn apply_changes(&mut self, head: Pos, turn: u32, changes: &[(Pos, Square)]) {
        for (pos, square) in changes {
            match self.index(*pos) {
                Some(i) => self.squares[i] = *square,
                None => warn!("Server changed cell {} outside the {}x{} board", pos, self.num_rows, self.num_cols),
            }
        }

        self.head = Some(head);
        self.turn = turn;
    }

    /// Compares the mirror with a WHOLE_GRID snapshot and adopts the snapshot.
    ///
    /// Returns true when the mirror had drifted.
    pub fn verify_grid(&mut self, squares: &[Square]) -> bool {
        if squares == self.squares.as_slice() {
            return false;
        }

        let differing = self
            .squares
            .iter()
            .zip(squares)
            .filter(|(ours, theirs)| ours != theirs)
            .count();
        warn!(
            "Board out of sync on turn {}: {} cells differ, {} vs {} cells",
            self.turn,
            differing,
            self.squares.len(),
            squares.len()
        );

        self.squares = squares.to_vec();
        true
    }

    pub fn died(&mut self) {
        self.alive = false;
    }

    pub fn finish(&mut self, results: GameResults) {
        self.in_game = false;
        self.alive = !results.died;
        self.last_results = Some(results);
    }
}
