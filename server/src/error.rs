//! Error types for the server crate.

use shared::protocol::ProtocolError;
use shared::ParseMoveError;
use std::io;
use thiserror::Error;

/// Why a client connection is being closed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("player was removed from the server")]
    Detached,
    #[error("{0} bytes waiting for a peer that is not reading")]
    Backlog(usize),
    #[error("no name received within {0:?}")]
    Unidentified(std::time::Duration),
}

/// A board layout that could not be loaded.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("could not read layout file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed layout: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Direction(#[from] ParseMoveError),
    #[error("layout must have at least one row and one column")]
    EmptyBoard,
    #[error("layout has no snakes")]
    NoSnakes,
    #[error("snake {snake} leaves the board at {pos}")]
    OutOfBounds { snake: usize, pos: shared::Pos },
    #[error("snake {snake} overlaps another body at {pos}")]
    Overlap { snake: usize, pos: shared::Pos },
}
