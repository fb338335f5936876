//! # Snake Arena Server Library
//!
//! This library hosts many turn-based multiplayer snake matches over TCP. It
//! accepts connections, forms matches from a pool of waiting players, resolves
//! every turn's moves simultaneously and keeps an Elo rating per player.
//!
//! ## Core Responsibilities
//!
//! ### Turn Resolution
//! Each match asks every living snake for a move, waits until all have
//! answered (but at least 80ms, at most 2000ms), then applies all moves at
//! once. Snakes that collide head-on, leave the board or run into a body die.
//! Only the cells that changed are sent to the players after each turn.
//!
//! ### Matchmaking
//! A fixed number of match slots is kept busy. Waiting players are drawn at
//! random whenever a slot is free and enough players are queued. Players of a
//! finished match go back to the queue unless they were kicked.
//!
//! ### Rating
//! When a match ends, snakes are ranked by growth (with a bonus for
//! surviving) and then by how long they lived. Ratings move by the gap
//! between that placement and the placement expected from the ratings.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Frame Loop
//! Everything runs on one task. Each frame reads from every connection,
//! advances every match, then writes to every connection. Matches are gated
//! on elapsed time instead of waiting, so no step blocks the loop.
//!
//! ### Players as Capabilities
//! Matches talk to a [`player::Player`], which is either backed by a network
//! connection or a local bot. Network players exchange packets with their
//! connection through channels, so neither side holds a reference to the other.
//!
//! ## Module Organization
//!
//! - `board`: the grid of squares and its change tracking
//! - `snake`: body segments and death bookkeeping
//! - `player`: the player capability and its network and bot variants
//! - `scoring`: placement scores and rating updates
//! - `game`: one match and its turn engine
//! - `layout`: board layouts and their JSON format
//! - `matchmaker`: match slots and the waiting pool
//! - `client_manager`: per-socket protocol handling
//! - `network`: the listener and the frame loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::layout::Layout;
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind("127.0.0.1:42069", Layout::default(), ServerConfig::default()).await?;
//!     server.add_bots(2);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod client_manager;
pub mod error;
pub mod game;
pub mod layout;
pub mod matchmaker;
pub mod network;
pub mod player;
pub mod scoring;
pub mod snake;
