//! One match: board, snakes, turn clock and final scoring.
//!
//! A match waits for every living snake to answer, then resolves all moves
//! at once. Advancement is driven by the caller passing the current time to
//! [`Game::try_advance`], so the match never blocks.

use crate::board::Board;
use crate::layout::Layout;
use crate::player::Player;
use crate::scoring::{self, Standing, SURVIVAL_BONUS};
use crate::snake::{DeathReason, Snake, SURVIVED_TURN};
use log::{error, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::protocol::GameResults;
use shared::{Pos, Square};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Snakes that have not answered this long after a move request are killed.
pub const MOVE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Shortest time between two turns, even when every move is already in.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(80);

pub struct Game {
    board: Board,
    num_food: usize,
    turn: u32,
    /// Indexed by snake id; `players[i]` controls `snakes[i]`.
    snakes: Vec<Snake>,
    players: Vec<Player>,
    /// Players handed in beyond the layout's snake count.
    bench: Vec<Player>,
    expected_scores: Vec<f64>,
    dead_this_turn: Vec<u32>,
    last_move_request: Instant,
    rng: StdRng,
    finished: bool,
}

impl Game {
    pub fn new(layout: &Layout, mut players: Vec<Player>, mut rng: StdRng, now: Instant) -> Self {
        for player in &mut players {
            debug_assert!(!player.in_game(), "{} is already in a match", player.name());
            player.set_in_game(true);
        }

        players.shuffle(&mut rng);

        if players.len() != layout.num_snakes() {
            error!(
                "Match created with {} players for a layout of {} snakes",
                players.len(),
                layout.num_snakes()
            );
        }

        let count = players.len().min(layout.num_snakes());
        let mut bench = players.split_off(count);
        for player in &mut bench {
            player.set_in_game(false);
        }

        let mut board = Board::new(layout.num_rows, layout.num_cols);
        let snakes: Vec<Snake> = layout
            .snakes
            .iter()
            .take(count)
            .enumerate()
            .map(|(id, start)| {
                let snake = Snake::new(id as u32, start.cells());
                for pos in snake.body() {
                    board.set(*pos, Square::Snake(id as u32));
                }
                snake
            })
            .collect();

        board.replenish_food(layout.num_food, &mut rng);

        for (snake, player) in snakes.iter().zip(players.iter_mut()) {
            player.begin_game(layout.num_rows, layout.num_cols, snake.id());
        }

        let ratings: Vec<i32> = players.iter().map(Player::elo).collect();
        let expected_scores = scoring::expected_scores(&ratings);

        let mut game = Self {
            board,
            num_food: layout.num_food,
            turn: 0,
            snakes,
            players,
            bench,
            expected_scores,
            dead_this_turn: Vec::new(),
            last_move_request: now,
            rng,
            finished: false,
        };

        game.push_changes();
        game.request_moves(now);
        game
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn num_rows(&self) -> u32 {
        self.board.num_rows()
    }

    pub fn num_cols(&self) -> u32 {
        self.board.num_cols()
    }

    pub fn squares(&self) -> &[Square] {
        self.board.squares()
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn snakes(&self) -> &[Snake] {
        &self.snakes
    }

    /// The player controlling snake `snake_id`.
    pub fn player(&self, snake_id: u32) -> Option<&Player> {
        self.players.get(snake_id as usize)
    }

    /// Every player handed to this match, including benched ones.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().chain(self.bench.iter())
    }

    pub fn dead_this_turn(&self) -> &[u32] {
        &self.dead_this_turn
    }

    pub fn alive_count(&self) -> usize {
        self.snakes.iter().filter(|snake| snake.is_alive()).count()
    }

    pub fn has_ended(&self) -> bool {
        self.alive_count() <= 1
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Resolves the turn if it is due. Returns whether a turn was played.
    ///
    /// A turn is due once [`MIN_TICK_INTERVAL`] has passed since moves were
    /// requested and every living snake has answered, or unconditionally once
    /// [`MOVE_TIMEOUT`] has passed. Snakes still silent at that point die.
    pub fn try_advance(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_move_request);
        if elapsed < MIN_TICK_INTERVAL {
            return false;
        }

        let mut waiting = Vec::new();
        for (id, snake) in self.snakes.iter().enumerate() {
            if snake.is_alive() && self.players[id].next_move().is_none() {
                waiting.push(id);
            }
        }

        if !waiting.is_empty() && elapsed < MOVE_TIMEOUT {
            return false;
        }

        self.dead_this_turn.clear();
        for id in waiting {
            self.kill_snake(id, DeathReason::Timeout);
        }

        self.tick(now);
        true
    }

    /// Applies every living snake's current move. Snakes without a move stay put.
    pub fn tick(&mut self, now: Instant) {
        let mut targets: BTreeMap<Pos, Vec<usize>> = BTreeMap::new();

        for (id, snake) in self.snakes.iter().enumerate() {
            if !snake.is_alive() {
                continue;
            }
            if let (Some(head), Some(mv)) = (snake.head(), self.players[id].next_move()) {
                targets.entry(head.moved(mv)).or_default().push(id);
            }
        }

        // Tails move first so a snake may follow its own or another tail.
        for (target, claimants) in &targets {
            if claimants.len() > 1 {
                for &id in claimants {
                    self.kill_snake(id, DeathReason::HeadCollision);
                }
            } else if self.board.get(*target) != Some(Square::Food) {
                let id = claimants[0];
                if let Some(tail) = self.snakes[id].retract_tail() {
                    self.board.set(tail, Square::Empty);
                }
            }
        }

        for (target, claimants) in targets {
            let &[id] = claimants.as_slice() else {
                continue;
            };

            match self.board.get(target) {
                None => self.kill_snake(id, DeathReason::OutOfBounds),
                Some(Square::Snake(owner)) if owner == id as u32 => {
                    self.kill_snake(id, DeathReason::OwnBody)
                }
                Some(Square::Snake(_)) => self.kill_snake(id, DeathReason::OtherBody),
                Some(_) => {
                    self.snakes[id].push_head(target);
                    self.board.set(target, Square::Snake(id as u32));
                }
            }
        }

        self.board.replenish_food(self.num_food, &mut self.rng);
        self.turn += 1;

        self.push_changes();
        self.request_moves(now);
    }

    fn kill_snake(&mut self, id: usize, reason: DeathReason) {
        let Some(cells) = self.snakes[id].kill(self.turn, reason) else {
            error!("Tried to kill snake {} twice", id);
            debug_assert!(false, "snake {} killed twice", id);
            return;
        };

        for pos in cells {
            self.board.set(pos, Square::Empty);
        }

        let player = &mut self.players[id];
        info!("Killing snake {} ({}): {}", id, player.name(), reason);
        player.died(reason);

        self.dead_this_turn.push(id as u32);
    }

    fn push_changes(&mut self) {
        let changes = self.board.take_changes(self.turn);

        for (snake, player) in self.snakes.iter().zip(self.players.iter_mut()) {
            if snake.is_alive() {
                player.receive_changes(&self.board, snake, &changes);
            }
        }
    }

    fn request_moves(&mut self, now: Instant) {
        for (snake, player) in self.snakes.iter().zip(self.players.iter_mut()) {
            if snake.is_alive() {
                player.ask_for_next_move(&self.board, snake);
            }
        }

        self.last_move_request = now;
    }

    /// Ranks the snakes, updates ratings and sends everyone their results.
    ///
    /// Returns the results indexed by snake id. Calling it again is a no-op.
    pub fn finish(&mut self) -> Vec<GameResults> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        for snake in &mut self.snakes {
            snake.mark_survived();
        }

        let standings: Vec<Standing> = self
            .snakes
            .iter()
            .map(|snake| {
                let bonus = if snake.is_alive() { SURVIVAL_BONUS } else { 0 };
                Standing {
                    growth: snake.final_size() as i64 - snake.start_size() as i64 + bonus,
                    died_on: snake.died_on().unwrap_or(SURVIVED_TURN),
                }
            })
            .collect();

        let placements = scoring::settle(&standings, &self.expected_scores);
        let mut results = Vec::with_capacity(self.snakes.len());

        for ((snake, player), placement) in self.snakes.iter().zip(self.players.iter_mut()).zip(&placements) {
            let new_elo = player.elo() + placement.elo_delta;
            player.set_elo(new_elo);

            let result = GameResults {
                died: !snake.is_alive(),
                length: snake.final_size() as u32,
                score: (placement.score * 1000.0).round() as i32,
                died_on: snake.died_on().unwrap_or(SURVIVED_TURN),
                rank: placement.rank,
                num_ties: placement.num_ties,
                new_elo,
            };

            info!(
                "{} finished rank {} with length {} ({:+} elo, now {})",
                player.name(),
                placement.rank,
                result.length,
                placement.elo_delta,
                new_elo
            );

            player.end_game(&result);
            results.push(result);
        }

        results
    }

    /// Hands every player back, in snake order followed by the bench.
    pub fn into_players(self) -> Vec<Player> {
        self.players.into_iter().chain(self.bench).collect()
    }

    #[cfg(test)]
    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }
}
