//! Binary wire protocol.
//!
//! Every packet starts with the same 4 byte header:
//!
//! ```text
//! [u16 body length LE][u8 packet type][u8 padding][body ...]
//! ```
//!
//! The body length excludes the header. Fixed-shape bodies are written with
//! bincode's default options (fixed-width little-endian integers, no framing),
//! which lines up byte for byte with the wire layout.

use crate::{Color, Move, Pos, Square, MAX_NAME_LEN};
use serde::{Deserialize, Serialize};
use std::mem;
use thiserror::Error;

pub const HEADER_LEN: usize = 4;

/// Largest inbound body the server buffers.
pub const SERVER_MAX_BODY: usize = 1024;

/// Largest inbound body a client buffers.
pub const CLIENT_MAX_BODY: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("{packet} body has invalid length {len}")]
    BadLength { packet: &'static str, len: usize },
    #[error("invalid move index {0}")]
    InvalidMove(u8),
    #[error("invalid square tag {0}")]
    InvalidSquare(u8),
    #[error("body of {0} bytes does not fit the length field")]
    BodyTooLarge(usize),
    #[error("name and color already received on this connection")]
    AlreadyIdentified,
    #[error("move received before name and color")]
    NotIdentified,
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Packet types sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientPacketType {
    NameAndColor = 0,
    MoveResponse = 1,
}

impl TryFrom<u8> for ClientPacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NameAndColor),
            1 => Ok(Self::MoveResponse),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Packet types sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerPacketType {
    ConnectionEstablished = 0,
    MoveRequest = 1,
    GameChanges = 2,
    GameStart = 3,
    WholeGrid = 4,
    SnakeDead = 5,
    GameResults = 6,
}

impl TryFrom<u8> for ServerPacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ConnectionEstablished),
            1 => Ok(Self::MoveRequest),
            2 => Ok(Self::GameChanges),
            3 => Ok(Self::GameStart),
            4 => Ok(Self::WholeGrid),
            5 => Ok(Self::SnakeDead),
            6 => Ok(Self::GameResults),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Final standing of one snake, sent when its match finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResults {
    pub died: bool,
    pub length: u32,
    /// Placement score in thousandths.
    pub score: i32,
    pub died_on: u32,
    pub rank: u32,
    pub num_ties: u32,
    pub new_elo: i32,
}

const GAME_RESULTS_LEN: usize = 25;

#[derive(Serialize, Deserialize)]
struct GameStartBody {
    num_rows: u32,
    num_cols: u32,
    snake_id: u32,
}

#[derive(Serialize, Deserialize)]
struct ChangesHeader {
    head_row: u32,
    head_col: u32,
    turn: u32,
}

const CHANGES_HEADER_LEN: usize = 12;
const WHOLE_GRID_CELL_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    NameAndColor { color: Color, name: String },
    MoveResponse(Move),
}

impl ClientPacket {
    pub fn packet_type(&self) -> ClientPacketType {
        match self {
            ClientPacket::NameAndColor { .. } => ClientPacketType::NameAndColor,
            ClientPacket::MoveResponse(_) => ClientPacketType::MoveResponse,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; HEADER_LEN];

        match self {
            ClientPacket::NameAndColor { color, name } => {
                buf.extend_from_slice(&[color.r, color.g, color.b]);
                buf.extend_from_slice(name.as_bytes());
            }
            ClientPacket::MoveResponse(mv) => buf.push(mv.index()),
        }

        finish_frame(buf, self.packet_type() as u8)
    }

    /// Parses a complete client packet body.
    ///
    /// Names are decoded lossily and cut to [`MAX_NAME_LEN`] characters.
    pub fn decode(packet_type: u8, body: &[u8]) -> Result<Self, ProtocolError> {
        match ClientPacketType::try_from(packet_type)? {
            ClientPacketType::NameAndColor => {
                if body.len() < 3 {
                    return Err(ProtocolError::BadLength {
                        packet: "NAME_AND_COLOR",
                        len: body.len(),
                    });
                }

                let color = Color::new(body[0], body[1], body[2]);
                let name = String::from_utf8_lossy(&body[3..])
                    .chars()
                    .take(MAX_NAME_LEN)
                    .collect();

                Ok(ClientPacket::NameAndColor { color, name })
            }
            ClientPacketType::MoveResponse => {
                let [index] = body else {
                    return Err(ProtocolError::BadLength {
                        packet: "MOVE_RESPONSE",
                        len: body.len(),
                    });
                };

                Move::from_index(*index)
                    .map(ClientPacket::MoveResponse)
                    .ok_or(ProtocolError::InvalidMove(*index))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    ConnectionEstablished,
    MoveRequest,
    /// Cells changed since the previous broadcast, with the receiver's head.
    GameChanges {
        head: Pos,
        turn: u32,
        changes: Vec<(Pos, Square)>,
    },
    GameStart {
        num_rows: u32,
        num_cols: u32,
        snake_id: u32,
    },
    /// Every square in row-major order. Only used to detect client desync.
    WholeGrid { squares: Vec<Square> },
    SnakeDead { reason: String },
    GameResults(GameResults),
}

impl ServerPacket {
    pub fn packet_type(&self) -> ServerPacketType {
        match self {
            ServerPacket::ConnectionEstablished => ServerPacketType::ConnectionEstablished,
            ServerPacket::MoveRequest => ServerPacketType::MoveRequest,
            ServerPacket::GameChanges { .. } => ServerPacketType::GameChanges,
            ServerPacket::GameStart { .. } => ServerPacketType::GameStart,
            ServerPacket::WholeGrid { .. } => ServerPacketType::WholeGrid,
            ServerPacket::SnakeDead { .. } => ServerPacketType::SnakeDead,
            ServerPacket::GameResults(_) => ServerPacketType::GameResults,
        }
    }

    /// Serializes header and body into one owned frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; HEADER_LEN];

        match self {
            ServerPacket::ConnectionEstablished | ServerPacket::MoveRequest => {}
            ServerPacket::GameChanges {
                head,
                turn,
                changes,
            } => {
                let header = ChangesHeader {
                    head_row: head.row as u32,
                    head_col: head.col as u32,
                    turn: *turn,
                };
                bincode::serialize_into(&mut buf, &header)?;

                for (pos, square) in changes {
                    bincode::serialize_into(
                        &mut buf,
                        &(pos.row as u32, pos.col as u32, square.tag()),
                    )?;
                    if let Some(owner) = square.owner() {
                        bincode::serialize_into(&mut buf, &owner)?;
                    }
                }
            }
            ServerPacket::GameStart {
                num_rows,
                num_cols,
                snake_id,
            } => {
                let body = GameStartBody {
                    num_rows: *num_rows,
                    num_cols: *num_cols,
                    snake_id: *snake_id,
                };
                bincode::serialize_into(&mut buf, &body)?;
            }
            ServerPacket::WholeGrid { squares } => {
                for square in squares {
                    bincode::serialize_into(&mut buf, &(square.tag(), square.owner().unwrap_or(0)))?;
                }
            }
            ServerPacket::SnakeDead { reason } => buf.extend_from_slice(reason.as_bytes()),
            ServerPacket::GameResults(results) => bincode::serialize_into(&mut buf, results)?,
        }

        finish_frame(buf, self.packet_type() as u8)
    }

    /// Parses a complete server packet body.
    pub fn decode(packet_type: u8, body: &[u8]) -> Result<Self, ProtocolError> {
        let kind = ServerPacketType::try_from(packet_type)?;
        let mut cursor = body;

        let packet = match kind {
            ServerPacketType::ConnectionEstablished => {
                expect_len(body, 0, "CONNECTION_ESTABLISHED")?;
                ServerPacket::ConnectionEstablished
            }
            ServerPacketType::MoveRequest => {
                expect_len(body, 0, "MOVE_REQUEST")?;
                ServerPacket::MoveRequest
            }
            ServerPacketType::GameChanges => {
                if body.len() < CHANGES_HEADER_LEN {
                    return Err(ProtocolError::BadLength {
                        packet: "GAME_CHANGES",
                        len: body.len(),
                    });
                }

                let header: ChangesHeader = bincode::deserialize_from(&mut cursor)?;
                let mut changes = Vec::new();

                while !cursor.is_empty() {
                    let (row, col, tag): (u32, u32, u8) = bincode::deserialize_from(&mut cursor)?;
                    let owner: u32 = if tag == Square::SNAKE_TAG {
                        bincode::deserialize_from(&mut cursor)?
                    } else {
                        0
                    };
                    let square = Square::from_tag(tag, owner).ok_or(ProtocolError::InvalidSquare(tag))?;
                    changes.push((Pos::new(row as i32, col as i32), square));
                }

                ServerPacket::GameChanges {
                    head: Pos::new(header.head_row as i32, header.head_col as i32),
                    turn: header.turn,
                    changes,
                }
            }
            ServerPacketType::GameStart => {
                expect_len(body, 12, "GAME_START")?;
                let start: GameStartBody = bincode::deserialize_from(&mut cursor)?;
                ServerPacket::GameStart {
                    num_rows: start.num_rows,
                    num_cols: start.num_cols,
                    snake_id: start.snake_id,
                }
            }
            ServerPacketType::WholeGrid => {
                if body.len() % WHOLE_GRID_CELL_LEN != 0 {
                    return Err(ProtocolError::BadLength {
                        packet: "WHOLE_GRID",
                        len: body.len(),
                    });
                }

                let mut squares = Vec::with_capacity(body.len() / WHOLE_GRID_CELL_LEN);
                while !cursor.is_empty() {
                    let (tag, owner): (u8, u32) = bincode::deserialize_from(&mut cursor)?;
                    squares.push(Square::from_tag(tag, owner).ok_or(ProtocolError::InvalidSquare(tag))?);
                }

                ServerPacket::WholeGrid { squares }
            }
            ServerPacketType::SnakeDead => ServerPacket::SnakeDead {
                reason: String::from_utf8_lossy(body).into_owned(),
            },
            ServerPacketType::GameResults => {
                expect_len(body, GAME_RESULTS_LEN, "GAME_RESULTS")?;
                ServerPacket::GameResults(bincode::deserialize_from(&mut cursor)?)
            }
        };

        Ok(packet)
    }
}

fn expect_len(body: &[u8], expected: usize, packet: &'static str) -> Result<(), ProtocolError> {
    if body.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::BadLength {
            packet,
            len: body.len(),
        })
    }
}

/// Fills in the header of a buffer whose first [`HEADER_LEN`] bytes were reserved.
fn finish_frame(mut buf: Vec<u8>, packet_type: u8) -> Result<Vec<u8>, ProtocolError> {
    let body_len = buf.len() - HEADER_LEN;
    let len = u16::try_from(body_len).map_err(|_| ProtocolError::BodyTooLarge(body_len))?;

    buf[..2].copy_from_slice(&len.to_le_bytes());
    buf[2] = packet_type;
    buf[3] = 0;

    Ok(buf)
}

/// A framed packet whose body has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub packet_type: u8,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    AwaitingHeader,
    AwaitingBody,
    Complete,
    /// Skipping the body of a packet larger than the reader accepts.
    Discarding,
}

/// Reassembles packets from a byte stream that may arrive in arbitrary fragments.
#[derive(Debug)]
pub struct PacketReader {
    state: ReadState,
    header: [u8; HEADER_LEN],
    header_received: usize,
    body: Vec<u8>,
    body_len: usize,
    skipped: usize,
    max_body: usize,
    discarded: usize,
}

impl PacketReader {
    pub fn new(max_body: usize) -> Self {
        Self {
            state: ReadState::AwaitingHeader,
            header: [0; HEADER_LEN],
            header_received: 0,
            body: Vec::new(),
            body_len: 0,
            skipped: 0,
            max_body,
            discarded: 0,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Number of oversized packets skipped so far.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Consumes bytes from `input` until one packet completes or the input runs out.
    ///
    /// Unconsumed bytes stay in `input`, so callers loop until this returns `None`.
    pub fn advance(&mut self, input: &mut &[u8]) -> Option<RawPacket> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    if input.is_empty() {
                        return None;
                    }

                    let chunk = take(input, HEADER_LEN - self.header_received);
                    self.header[self.header_received..self.header_received + chunk.len()]
                        .copy_from_slice(chunk);
                    self.header_received += chunk.len();

                    if self.header_received == HEADER_LEN {
                        self.body_len = u16::from_le_bytes([self.header[0], self.header[1]]) as usize;
                        self.body.clear();

                        self.state = if self.body_len == 0 {
                            ReadState::Complete
                        } else if self.body_len > self.max_body {
                            self.skipped = 0;
                            ReadState::Discarding
                        } else {
                            ReadState::AwaitingBody
                        };
                    }
                }
                ReadState::AwaitingBody => {
                    if input.is_empty() {
                        return None;
                    }

                    let chunk = take(input, self.body_len - self.body.len());
                    self.body.extend_from_slice(chunk);

                    if self.body.len() == self.body_len {
                        self.state = ReadState::Complete;
                    }
                }
                ReadState::Discarding => {
                    if input.is_empty() {
                        return None;
                    }

                    self.skipped += take(input, self.body_len - self.skipped).len();

                    if self.skipped == self.body_len {
                        self.discarded += 1;
                        self.header_received = 0;
                        self.state = ReadState::AwaitingHeader;
                    }
                }
                ReadState::Complete => {
                    let packet = RawPacket {
                        packet_type: self.header[2],
                        body: mem::take(&mut self.body),
                    };

                    self.header_received = 0;
                    self.state = ReadState::AwaitingHeader;

                    return Some(packet);
                }
            }
        }
    }
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> &'a [u8] {
    let n = n.min(input.len());
    let (head, rest) = input.split_at(n);
    *input = rest;
    head
}
