//! Players supply one move per turn and receive match lifecycle events.
//!
//! A [`Player`] wraps either a [`NetworkPlayer`], which talks to a remote
//! client through in-memory channels owned by its connection, or a
//! [`LocalPlayer`] that picks safe moves on the server itself.

use crate::board::{Board, Changes};
use crate::snake::{DeathReason, Snake};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use shared::protocol::{GameResults, ServerPacket};
use shared::{Color, Move};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub const INITIAL_ELO: i32 = 1000;

/// Hooks a match calls on whatever is controlling a snake.
///
/// Only the move methods are required; lifecycle hooks default to no-ops.
pub trait Controller {
    /// Starts sourcing the move for the coming turn.
    fn prepare_next_move(&mut self, board: &Board, snake: &Snake);

    /// Non-blocking poll for the move requested by [`Controller::prepare_next_move`].
    fn query_next_move(&mut self) -> Option<Move>;

    fn begin_game(&mut self, _num_rows: u32, _num_cols: u32, _snake_id: u32) {}

    fn receive_changes(&mut self, _board: &Board, _snake: &Snake, _changes: &Changes) {}

    fn on_death(&mut self, _reason: DeathReason) {}

    fn end_game(&mut self, _results: &GameResults) {}

    /// Called once when the player leaves the server.
    fn on_removed(&mut self) {}

    fn is_disconnected(&self) -> bool {
        false
    }
}

/// Connection-side ends of the channels backing a [`NetworkPlayer`].
///
/// Moves go through a single slot, so a client that keeps answering only
/// ever overwrites its latest move.
#[derive(Debug)]
pub struct PlayerLink {
    pub moves: watch::Sender<Option<Move>>,
    pub outbound: UnboundedReceiver<ServerPacket>,
}

#[derive(Debug)]
pub struct NetworkPlayer {
    outbound: Option<UnboundedSender<ServerPacket>>,
    moves: watch::Receiver<Option<Move>>,
}

impl NetworkPlayer {
    /// Creates a player together with the link its connection keeps.
    pub fn pair() -> (NetworkPlayer, PlayerLink) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (moves_tx, moves_rx) = watch::channel(None);

        let player = NetworkPlayer {
            outbound: Some(outbound_tx),
            moves: moves_rx,
        };
        let link = PlayerLink {
            moves: moves_tx,
            outbound: outbound_rx,
        };

        (player, link)
    }

    fn send(&self, packet: ServerPacket) {
        if let Some(outbound) = &self.outbound {
            if outbound.send(packet).is_err() {
                debug!("Dropping packet for closed connection");
            }
        }
    }
}

impl Controller for NetworkPlayer {
    fn prepare_next_move(&mut self, _board: &Board, _snake: &Snake) {
        // Answers to earlier requests must not count for this turn.
        let _ = self.moves.borrow_and_update();
        self.send(ServerPacket::MoveRequest);
    }

    fn query_next_move(&mut self) -> Option<Move> {
        if !self.moves.has_changed().unwrap_or(false) {
            return None;
        }
        *self.moves.borrow_and_update()
    }

    fn begin_game(&mut self, num_rows: u32, num_cols: u32, snake_id: u32) {
        self.send(ServerPacket::GameStart {
            num_rows,
            num_cols,
            snake_id,
        });
    }

    fn receive_changes(&mut self, board: &Board, snake: &Snake, changes: &Changes) {
        let Some(head) = snake.head() else {
            return;
        };

        self.send(ServerPacket::GameChanges {
            head,
            turn: changes.new_turn,
            changes: changes.squares.iter().map(|(pos, square)| (*pos, *square)).collect(),
        });

        #[cfg(debug_assertions)]
        self.send(ServerPacket::WholeGrid {
            squares: board.squares().to_vec(),
        });
        #[cfg(not(debug_assertions))]
        let _ = board;
    }

    fn on_death(&mut self, reason: DeathReason) {
        self.send(ServerPacket::SnakeDead {
            reason: reason.to_string(),
        });
    }

    fn end_game(&mut self, results: &GameResults) {
        self.send(ServerPacket::GameResults(*results));
    }

    fn on_removed(&mut self) {
        self.outbound = None;
    }

    fn is_disconnected(&self) -> bool {
        self.outbound.as_ref().map_or(true, |outbound| outbound.is_closed())
    }
}

/// Server-side bot that moves uniformly at random among safe squares.
#[derive(Debug)]
pub struct LocalPlayer {
    rng: StdRng,
    next: Option<Move>,
}

impl LocalPlayer {
    pub fn new(rng: StdRng) -> Self {
        Self { rng, next: None }
    }

    /// Moves that stay on the board and land on a traversable square.
    pub fn safe_moves(board: &Board, snake: &Snake) -> Vec<Move> {
        let Some(head) = snake.head() else {
            return Vec::new();
        };

        Move::ALL
            .into_iter()
            .filter(|mv| board.is_free(head.moved(*mv)))
            .collect()
    }
}

impl Controller for LocalPlayer {
    fn prepare_next_move(&mut self, board: &Board, snake: &Snake) {
        let safe = Self::safe_moves(board, snake);
        self.next = Some(safe.choose(&mut self.rng).copied().unwrap_or(Move::Up));
    }

    fn query_next_move(&mut self) -> Option<Move> {
        self.next
    }
}

#[derive(Debug)]
pub enum PlayerKind {
    Network(NetworkPlayer),
    Local(LocalPlayer),
}

impl PlayerKind {
    fn controller(&mut self) -> &mut dyn Controller {
        match self {
            PlayerKind::Network(player) => player,
            PlayerKind::Local(player) => player,
        }
    }

    fn is_disconnected(&self) -> bool {
        match self {
            PlayerKind::Network(player) => player.is_disconnected(),
            PlayerKind::Local(player) => player.is_disconnected(),
        }
    }
}

/// A participant known to the matchmaker.
#[derive(Debug)]
pub struct Player {
    name: String,
    color: Color,
    elo: i32,
    in_game: bool,
    kicked: bool,
    saved_move: Option<Move>,
    kind: PlayerKind,
}

impl Player {
    pub fn new(name: impl Into<String>, color: Color, kind: PlayerKind) -> Self {
        Self {
            name: name.into(),
            color,
            elo: INITIAL_ELO,
            in_game: false,
            kicked: false,
            saved_move: None,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn elo(&self) -> i32 {
        self.elo
    }

    pub fn set_elo(&mut self, elo: i32) {
        self.elo = elo;
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn set_in_game(&mut self, in_game: bool) {
        self.in_game = in_game;
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, PlayerKind::Local(_))
    }

    /// Kicked by a timeout or left behind by a closed connection.
    pub fn is_kicked(&self) -> bool {
        self.kicked || self.kind.is_disconnected()
    }

    pub fn kick(&mut self) {
        self.kicked = true;
    }

    /// Clears the cached move and starts sourcing the next one.
    pub fn ask_for_next_move(&mut self, board: &Board, snake: &Snake) {
        self.saved_move = None;
        self.kind.controller().prepare_next_move(board, snake);
    }

    /// The move for the current turn. Once a move is seen it is kept until
    /// [`Player::ask_for_next_move`] is called again.
    pub fn next_move(&mut self) -> Option<Move> {
        if self.saved_move.is_none() {
            self.saved_move = self.kind.controller().query_next_move();
        }
        self.saved_move
    }

    pub fn begin_game(&mut self, num_rows: u32, num_cols: u32, snake_id: u32) {
        self.saved_move = None;
        self.kind.controller().begin_game(num_rows, num_cols, snake_id);
    }

    pub fn receive_changes(&mut self, board: &Board, snake: &Snake, changes: &Changes) {
        self.kind.controller().receive_changes(board, snake, changes);
    }

    pub fn died(&mut self, reason: DeathReason) {
        if reason.is_timeout() {
            self.kicked = true;
        }
        self.kind.controller().on_death(reason);
    }

    pub fn end_game(&mut self, results: &GameResults) {
        self.kind.controller().end_game(results);
    }

    /// Detaches the player from its connection. Consumes the player so it runs once.
    pub fn remove(mut self) {
        debug!("Removing player {}", self.name);
        self.kind.controller().on_removed();
    }
}
