//! # Snake Arena Client Library
//!
//! A headless client for the snake arena server. It connects over TCP,
//! introduces itself with a name and color, mirrors the board of every match
//! it is placed in and answers each move request with a move chosen by a
//! pluggable brain.
//!
//! ## Board Mirroring
//! The server only sends the cells that changed after each turn. The client
//! applies those diffs to its own copy of the grid. Debug builds of the server
//! also send the whole grid, which the client compares against its copy and
//! adopts when the two have drifted apart.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The mirrored board, the snake's head and the results of the last match.
//!
//! ### Brain Module (`brain`)
//! The [`brain::SnakeBrain`] trait and the bundled move pickers:
//! - `RandomSafeBrain`: random safe move, food first
//! - `FixedBrain`: always the same move
//!
//! ### Network Module (`network`)
//! The connection itself: framing, decoding and the read loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::brain::RandomSafeBrain;
//! use client::network::Client;
//! use rand::{rngs::StdRng, SeedableRng};
//! use shared::Color;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let brain = RandomSafeBrain::new(StdRng::from_entropy());
//!     let mut client = Client::connect("127.0.0.1:42069", "sidewinder", Color::new(40, 200, 90), brain).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod brain;
pub mod game;
pub mod network;
