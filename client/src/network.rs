use crate::brain::SnakeBrain;
use crate::game::ClientGameState;
use log::{debug, info, warn};
use shared::protocol::{ClientPacket, PacketReader, ServerPacket, CLIENT_MAX_BODY};
use shared::Color;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A bot connection: mirrors the board and answers every move request.
pub struct Client<B: SnakeBrain> {
    stream: TcpStream,
    reader: PacketReader,

    game_state: ClientGameState,
    brain: B,

    connected: bool,
    matches_played: usize,
}

impl<B: SnakeBrain> Client<B> {
    /// Connects and introduces itself with `name` and `color`.
    pub async fn connect(
        server_addr: &str,
        name: &str,
        color: Color,
        brain: B,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {} as {}", server_addr, name);

        let mut client = Client {
            stream,
            reader: PacketReader::new(CLIENT_MAX_BODY),
            game_state: ClientGameState::new(),
            brain,
            connected: false,
            matches_played: 0,
        };

        client
            .send_packet(&ClientPacket::NameAndColor {
                color,
                name: name.to_string(),
            })
            .await?;

        Ok(client)
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn matches_played(&self) -> usize {
        self.matches_played
    }

    async fn send_packet(&mut self, packet: &ClientPacket) -> Result<(), Box<dyn std::error::Error>> {
        let frame = packet.encode()?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Updates local state from one server packet and returns the reply, if any.
    pub fn handle_packet(&mut self, packet: ServerPacket) -> Option<ClientPacket> {
        match packet {
            ServerPacket::ConnectionEstablished => {
                info!("Server accepted the connection, waiting for a match");
                self.connected = true;
            }

            ServerPacket::GameStart {
                num_rows,
                num_cols,
                snake_id,
            } => {
                info!("Match started on a {}x{} board", num_rows, num_cols);
                self.game_state.start(num_rows, num_cols, snake_id);
            }

            ServerPacket::GameChanges { head, turn, changes } => {
                self.game_state.apply_changes(head, turn, &changes);
            }

            ServerPacket::WholeGrid { squares } => {
                self.game_state.verify_grid(&squares);
            }

            ServerPacket::MoveRequest => {
                let mv = self.brain.choose_move(&self.game_state);
                debug!("Turn {}: moving {:?}", self.game_state.turn(), mv);
                return Some(ClientPacket::MoveResponse(mv));
            }

            ServerPacket::SnakeDead { reason } => {
                info!("Snake died on turn {}: {}", self.game_state.turn(), reason);
                self.game_state.died();
            }

            ServerPacket::GameResults(results) => {
                info!(
                    "Match over: rank {} ({} tied), length {}, rating now {}",
                    results.rank, results.num_ties, results.length, results.new_elo
                );
                self.game_state.finish(results);
                self.matches_played += 1;
            }
        }

        None
    }

    /// Plays until the server closes the connection.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_matches(None).await
    }

    /// Plays until `limit` matches have finished, or until the server closes.
    pub async fn run_matches(&mut self, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
        let mut buffer = vec![0u8; 4096];

        loop {
            if limit.is_some_and(|limit| self.matches_played >= limit) {
                return Ok(());
            }

            let len = self.stream.read(&mut buffer).await?;
            if len == 0 {
                info!("Server closed the connection");
                self.connected = false;
                return Ok(());
            }

            let discarded = self.reader.discarded();
            let mut input = &buffer[..len];

            while let Some(raw) = self.reader.advance(&mut input) {
                match ServerPacket::decode(raw.packet_type, &raw.body) {
                    Ok(packet) => {
                        if let Some(reply) = self.handle_packet(packet) {
                            self.send_packet(&reply).await?;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed packet of type {}: {}", raw.packet_type, e),
                }
            }

            if self.reader.discarded() > discarded {
                warn!("Skipped a packet larger than {} bytes", CLIENT_MAX_BODY);
            }
        }
    }
}
