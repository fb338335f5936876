//! Client connection management for the snake server
//!
//! This module owns every accepted TCP socket and drives it without blocking:
//! - Inbound bytes are read with non-blocking reads and reassembled into packets
//! - Identified connections are linked to a network player in the matchmaker
//! - Outbound packets from that player are encoded and flushed each frame
//! - Dead, misbehaving or silent connections are pruned
//!
//! A connection and its player only share a pair of channels. Dropping the
//! connection closes them, which the player reports as a disconnect, and
//! removing the player closes them from the other side, which prunes the
//! connection on the next frame.

use crate::error::ClientError;
use crate::matchmaker::Matchmaker;
use crate::player::{NetworkPlayer, Player, PlayerKind, PlayerLink};
use log::{debug, info, warn};
use shared::protocol::{ClientPacket, PacketReader, ProtocolError, RawPacket, ServerPacket, SERVER_MAX_BODY};
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;

/// How long a connection may stay open without sending its name and colour.
pub const IDENTIFY_GRACE: Duration = Duration::from_secs(10);

/// How long a connection whose player was removed may keep flushing.
pub const DETACH_GRACE: Duration = Duration::from_secs(1);

/// Default ceiling on bytes waiting for a slow peer.
pub const MAX_OUTBOX: usize = 4 * 1024 * 1024;

const READ_CHUNK: usize = 1024;

/// One accepted socket and its protocol state
///
/// Each client maintains:
/// - The socket and a [`PacketReader`] for partially received packets
/// - An outbox of encoded bytes the socket has not accepted yet
/// - The link to its player once NAME_AND_COLOR has arrived
/// - When that player was removed, while the last packets drain
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Peer address, for logging
    pub addr: SocketAddr,
    stream: TcpStream,
    reader: PacketReader,
    outbox: Vec<u8>,
    /// When the socket was accepted
    connected_at: Instant,
    link: Option<PlayerLink>,
    detached_at: Option<Instant>,
}

impl Client {
    pub fn new(id: u32, stream: TcpStream, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            stream,
            reader: PacketReader::new(SERVER_MAX_BODY),
            outbox: Vec::new(),
            connected_at: now,
            link: None,
            detached_at: None,
        }
    }

    /// Whether NAME_AND_COLOR has been received
    pub fn is_identified(&self) -> bool {
        self.link.is_some()
    }

    /// Reads everything the socket has buffered and dispatches complete packets
    ///
    /// Returns an error when the peer closed the socket, the socket failed, or
    /// a packet broke the protocol. The caller drops the client in all cases.
    pub fn poll_inbound(&mut self, matchmaker: &mut Matchmaker) -> Result<(), ClientError> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match self.stream.try_read(&mut buf) {
                Ok(0) => return Err(ClientError::Closed),
                Ok(n) => {
                    let discarded = self.reader.discarded();
                    let mut input = &buf[..n];

                    while let Some(packet) = self.reader.advance(&mut input) {
                        self.handle_packet(packet, matchmaker)?;
                    }

                    if self.reader.discarded() > discarded {
                        warn!("Client {} sent a packet over {} bytes, skipped it", self.id, SERVER_MAX_BODY);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Applies one complete packet
    ///
    /// NAME_AND_COLOR creates the player and queues it in the matchmaker.
    /// MOVE_RESPONSE is forwarded to the player, which decides whether the
    /// current turn still accepts it.
    fn handle_packet(&mut self, raw: RawPacket, matchmaker: &mut Matchmaker) -> Result<(), ClientError> {
        match ClientPacket::decode(raw.packet_type, &raw.body)? {
            ClientPacket::NameAndColor { color, name } => {
                if self.link.is_some() {
                    return Err(ProtocolError::AlreadyIdentified.into());
                }

                self.queue(&ServerPacket::ConnectionEstablished)?;

                let (player, link) = NetworkPlayer::pair();
                let name = matchmaker.add_player(Player::new(name, color, PlayerKind::Network(player)));
                info!("Client {} ({}) identified as {}", self.id, self.addr, name);

                self.link = Some(link);
            }
            ClientPacket::MoveResponse(mv) => {
                let link = self.link.as_ref().ok_or(ProtocolError::NotIdentified)?;
                if link.moves.send(Some(mv)).is_err() {
                    debug!("Client {} answered after its player was removed", self.id);
                }
            }
        }

        Ok(())
    }

    fn queue(&mut self, packet: &ServerPacket) -> Result<(), ClientError> {
        let frame = packet.encode()?;
        self.outbox.extend_from_slice(&frame);
        Ok(())
    }

    /// Encodes pending player packets and writes as much as the socket accepts
    ///
    /// Unwritten bytes stay in the outbox for the next frame. Once the player
    /// has been removed, returns [`ClientError::Detached`] as soon as the
    /// outbox is empty or [`DETACH_GRACE`] has passed. Fails with
    /// [`ClientError::Backlog`] when more than `outbox_limit` bytes are waiting.
    pub fn flush_outbound(&mut self, now: Instant, outbox_limit: usize) -> Result<(), ClientError> {
        let mut detached = false;

        if let Some(link) = &mut self.link {
            loop {
                match link.outbound.try_recv() {
                    Ok(packet) => match packet.encode() {
                        Ok(frame) => self.outbox.extend_from_slice(&frame),
                        Err(e) => warn!("Dropping {:?} for client {}: {}", packet.packet_type(), self.id, e),
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        detached = true;
                        break;
                    }
                }
            }
        }

        while !self.outbox.is_empty() {
            match self.stream.try_write(&self.outbox) {
                Ok(0) => return Err(ClientError::Closed),
                Ok(n) => {
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        if self.outbox.len() > outbox_limit {
            return Err(ClientError::Backlog(self.outbox.len()));
        }

        if detached {
            let since = *self.detached_at.get_or_insert(now);
            if self.outbox.is_empty() || now.saturating_duration_since(since) >= DETACH_GRACE {
                return Err(ClientError::Detached);
            }
        }

        Ok(())
    }

    /// Fails connections that never identified within [`IDENTIFY_GRACE`]
    pub fn check_identified(&self, now: Instant) -> Result<(), ClientError> {
        if self.link.is_none() && now.saturating_duration_since(self.connected_at) >= IDENTIFY_GRACE {
            return Err(ClientError::Unidentified(IDENTIFY_GRACE));
        }
        Ok(())
    }
}

/// Manages all open connections
///
/// The ClientManager accepts sockets from the server loop, drives each
/// connection once per frame in id order, and drops the ones that failed.
/// Dropping a client closes its player link, so the matchmaker sees the
/// player as kicked on its next pass.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: BTreeMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Bytes a connection may have waiting before it is dropped
    outbox_limit: usize,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::with_outbox_limit(MAX_OUTBOX)
    }

    pub fn with_outbox_limit(outbox_limit: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            outbox_limit,
        }
    }

    /// Registers an accepted socket and returns its client id
    pub fn add_client(&mut self, stream: TcpStream, addr: SocketAddr, now: Instant) -> u32 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for client {}: {}", client_id, e);
        }

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, stream, addr, now));

        client_id
    }

    /// Reads and dispatches inbound packets on every connection
    pub fn poll(&mut self, matchmaker: &mut Matchmaker, now: Instant) {
        let mut failed = Vec::new();

        for (id, client) in &mut self.clients {
            let result = client
                .poll_inbound(matchmaker)
                .and_then(|()| client.check_identified(now));

            if let Err(e) = result {
                failed.push((*id, e));
            }
        }

        self.drop_clients(failed);
    }

    /// Writes queued packets on every connection
    pub fn flush(&mut self, now: Instant) {
        let mut failed = Vec::new();

        for (id, client) in &mut self.clients {
            if let Err(e) = client.flush_outbound(now, self.outbox_limit) {
                failed.push((*id, e));
            }
        }

        self.drop_clients(failed);
    }

    fn drop_clients(&mut self, failed: Vec<(u32, ClientError)>) {
        for (id, error) in failed {
            let Some(client) = self.clients.remove(&id) else {
                continue;
            };

            match error {
                ClientError::Protocol(e) => warn!("Client {} ({}) broke protocol: {}", id, client.addr, e),
                ClientError::Io(e) => warn!("Client {} ({}) socket error: {}", id, client.addr, e),
                ClientError::Backlog(bytes) => warn!("Client {} ({}) stopped reading, {} bytes unsent", id, client.addr, bytes),
                other => info!("Client {} ({}) disconnected: {}", id, client.addr, other),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of connections that have sent their name
    pub fn identified(&self) -> usize {
        self.clients.values().filter(|client| client.is_identified()).count()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::protocol::{ServerPacketType, CLIENT_MAX_BODY};
    use tokio::sync::{mpsc, watch};
    use shared::{Color, Move};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn connected_pair(manager: &mut ClientManager, now: Instant) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = TcpStream::connect(addr).await.unwrap();
        let (stream, remote) = listener.accept().await.unwrap();
        manager.add_client(stream, remote, now);

        peer
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn matchmaker() -> Matchmaker {
        Matchmaker::new(1, Layout::default(), StdRng::seed_from_u64(1))
    }

    fn hello(name: &str) -> Vec<u8> {
        ClientPacket::NameAndColor {
            color: Color::new(200, 100, 0),
            name: name.to_string(),
        }
        .encode()
        .unwrap()
    }

    async fn read_packet(peer: &mut TcpStream) -> ServerPacket {
        let mut reader = PacketReader::new(CLIENT_MAX_BODY);
        let mut buf = [0u8; 256];
        loop {
            let n = peer.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed the connection");
            let mut input = &buf[..n];
            if let Some(raw) = reader.advance(&mut input) {
                return ServerPacket::decode(raw.packet_type, &raw.body).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_identify_joins_pool() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        // Split the packet so the header arrives in two reads.
        let frame = hello("Bob");
        peer.write_all(&frame[..2]).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);
        assert_eq!(manager.identified(), 0);

        peer.write_all(&frame[2..]).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);
        manager.flush(now);

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.identified(), 1);
        assert_eq!(matchmaker.free_players().len(), 1);
        assert_eq!(matchmaker.free_players()[0].name(), "Bob");
        assert_eq!(
            read_packet(&mut peer).await.packet_type(),
            ServerPacketType::ConnectionEstablished
        );
    }

    #[tokio::test]
    async fn test_move_before_name_closes_connection() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        peer.write_all(&ClientPacket::MoveResponse(Move::Up).encode().unwrap())
            .await
            .unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        assert!(manager.is_empty());
        assert!(matchmaker.free_players().is_empty());
    }

    #[tokio::test]
    async fn test_second_name_closes_connection() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        let mut stream = hello("Bob");
        stream.extend(hello("Bob"));
        peer.write_all(&stream).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        assert!(manager.is_empty());
        assert!(matchmaker.free_players()[0].is_kicked());

        matchmaker.tick(now);
        assert!(matchmaker.free_players().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_packet_type_closes_connection() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        peer.write_all(&[0, 0, 7, 0]).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_peer_close_kicks_player() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        peer.write_all(&hello("Alice")).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);
        assert_eq!(manager.identified(), 1);

        drop(peer);
        settle().await;
        manager.poll(&mut matchmaker, now);

        assert!(manager.is_empty());
        assert!(matchmaker.free_players()[0].is_kicked());
    }

    #[tokio::test]
    async fn test_silent_connection_is_pruned_after_grace() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let _peer = connected_pair(&mut manager, now).await;

        manager.poll(&mut matchmaker, now + IDENTIFY_GRACE - Duration::from_millis(1));
        assert_eq!(manager.len(), 1);

        manager.poll(&mut matchmaker, now + IDENTIFY_GRACE);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_packet_is_skipped() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        let mut stream = vec![0x00, 0x08, 0, 0];
        stream.extend(std::iter::repeat(0u8).take(0x0800));
        stream.extend(hello("Carol"));
        peer.write_all(&stream).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        assert_eq!(manager.len(), 1);
        assert_eq!(matchmaker.free_players()[0].name(), "Carol");
    }

    #[tokio::test]
    async fn test_duplicate_name_is_suffixed() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut first = connected_pair(&mut manager, now).await;
        let mut second = connected_pair(&mut manager, now).await;

        first.write_all(&hello("Bob")).await.unwrap();
        second.write_all(&hello("Bob")).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        let mut names: Vec<&str> = matchmaker.free_players().iter().map(Player::name).collect();
        names.sort();
        assert_eq!(names, vec!["Bob", "Bob 1"]);
    }

    /// Attaches a raw link to client `id` and returns the sending half of its outbound queue.
    fn attach(manager: &mut ClientManager, id: u32) -> mpsc::UnboundedSender<ServerPacket> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (moves_tx, _) = watch::channel(None);
        manager.clients.get_mut(&id).unwrap().link = Some(PlayerLink {
            moves: moves_tx,
            outbound: outbound_rx,
        });
        outbound_tx
    }

    /// Far more than loopback socket buffers absorb.
    fn flood(outbound: &mpsc::UnboundedSender<ServerPacket>) {
        let reason = "x".repeat(60_000);
        for _ in 0..1200 {
            outbound
                .send(ServerPacket::SnakeDead { reason: reason.clone() })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_detached_client_drains_before_closing() {
        let now = Instant::now();
        let mut manager = ClientManager::with_outbox_limit(usize::MAX);
        let _peer = connected_pair(&mut manager, now).await;

        let outbound = attach(&mut manager, 1);
        flood(&outbound);
        drop(outbound);

        // The peer is not reading, so bytes are still waiting.
        manager.flush(now);
        assert_eq!(manager.len(), 1);

        manager.flush(now + DETACH_GRACE - Duration::from_millis(1));
        assert_eq!(manager.len(), 1);

        manager.flush(now + DETACH_GRACE);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_detached_client_delivers_last_packets() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut peer = connected_pair(&mut manager, now).await;

        let outbound = attach(&mut manager, 1);
        outbound
            .send(ServerPacket::SnakeDead {
                reason: "Out of bounds".to_string(),
            })
            .unwrap();
        drop(outbound);

        manager.flush(now);
        assert!(manager.is_empty());
        assert_eq!(
            read_packet(&mut peer).await,
            ServerPacket::SnakeDead {
                reason: "Out of bounds".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_slow_reader_is_dropped_over_outbox_limit() {
        let now = Instant::now();
        let mut manager = ClientManager::with_outbox_limit(1024 * 1024);
        let _peer = connected_pair(&mut manager, now).await;

        let outbound = attach(&mut manager, 1);
        flood(&outbound);

        manager.flush(now);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_removed_player_closes_connection() {
        let now = Instant::now();
        let mut manager = ClientManager::new();
        let mut matchmaker = matchmaker();
        let mut peer = connected_pair(&mut manager, now).await;

        peer.write_all(&hello("Dan")).await.unwrap();
        settle().await;
        manager.poll(&mut matchmaker, now);

        // Players go away with the pool that owns them.
        drop(matchmaker);

        manager.flush(now);
        assert!(manager.is_empty());
        assert_eq!(
            read_packet(&mut peer).await.packet_type(),
            ServerPacketType::ConnectionEstablished
        );
    }
}
