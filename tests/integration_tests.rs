//! Integration tests for the snake arena
//!
//! These tests run a real server on a loopback port and talk to it the way
//! clients do, either with hand-written frames or with the client library.

use client::brain::FixedBrain;
use client::network::Client;
use server::layout::{Layout, SnakeStart};
use server::network::{Server, ServerConfig};
use server::snake::SURVIVED_TURN;
use shared::protocol::{ClientPacket, GameResults, PacketReader, ServerPacket, CLIENT_MAX_BODY};
use shared::{Color, Move, Pos};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

/// Two snakes far apart on a 10x10 board, no food
fn duel_layout() -> Layout {
    Layout {
        num_rows: 10,
        num_cols: 10,
        num_food: 0,
        snakes: vec![
            SnakeStart::new(Pos::new(1, 1), vec![Move::Right]),
            SnakeStart::new(Pos::new(8, 8), vec![Move::Left]),
        ],
    }
}

fn duel_config() -> ServerConfig {
    ServerConfig {
        target_games: 1,
        frame_interval: Duration::from_millis(5),
        seed: Some(7),
        ..ServerConfig::default()
    }
}

/// Minimal client speaking raw frames
struct RawClient {
    stream: TcpStream,
    reader: PacketReader,
    pending: Vec<ServerPacket>,
}

impl RawClient {
    async fn connect(addr: &str, name: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let hello = ClientPacket::NameAndColor {
            color: Color::new(120, 40, 200),
            name: name.to_string(),
        };
        stream.write_all(&hello.encode().unwrap()).await.unwrap();

        RawClient {
            stream,
            reader: PacketReader::new(CLIENT_MAX_BODY),
            pending: Vec::new(),
        }
    }

    /// Next packet, or `None` once the server closed the connection
    async fn recv(&mut self) -> Option<ServerPacket> {
        let mut buf = [0u8; 1024];
        while self.pending.is_empty() {
            let n = timeout(Duration::from_secs(10), self.stream.read(&mut buf))
                .await
                .expect("server went quiet")
                .unwrap_or(0);
            if n == 0 {
                return None;
            }

            let mut input = &buf[..n];
            while let Some(raw) = self.reader.advance(&mut input) {
                self.pending.push(ServerPacket::decode(raw.packet_type, &raw.body).unwrap());
            }
        }
        Some(self.pending.remove(0))
    }

    async fn send_move(&mut self, mv: Move) {
        let frame = ClientPacket::MoveResponse(mv).encode().unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }
}

/// WIRE FRAMING TESTS
mod framing_tests {
    use super::*;

    /// Packets split into tiny TCP writes reassemble in order
    #[tokio::test]
    async fn fragmented_stream_reassembles() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let packets = vec![
            ServerPacket::ConnectionEstablished,
            ServerPacket::GameStart {
                num_rows: 10,
                num_cols: 12,
                snake_id: 1,
            },
            ServerPacket::SnakeDead {
                reason: "Out of bounds".to_string(),
            },
            ServerPacket::MoveRequest,
        ];
        let bytes: Vec<u8> = packets.iter().flat_map(|p| p.encode().unwrap()).collect();

        let writer = async {
            let (mut stream, _) = listener.accept().await.unwrap();
            for chunk in bytes.chunks(3) {
                stream.write_all(chunk).await.unwrap();
                stream.flush().await.unwrap();
                sleep(Duration::from_millis(2)).await;
            }
        };

        let reader = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut reader = PacketReader::new(CLIENT_MAX_BODY);
            let mut received = Vec::new();
            let mut buf = [0u8; 64];

            while received.len() < 4 {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "stream ended early");
                let mut input = &buf[..n];
                while let Some(raw) = reader.advance(&mut input) {
                    received.push(ServerPacket::decode(raw.packet_type, &raw.body).unwrap());
                }
            }
            received
        };

        let ((), received) = tokio::join!(writer, reader);
        assert_eq!(received, packets);
    }
}

/// END-TO-END MATCH TESTS
mod match_tests {
    use super::*;

    /// A player that never answers is killed at the deadline, and the one that
    /// answered wins the match and gains rating
    #[tokio::test]
    async fn silent_player_times_out_and_loses() {
        let mut server = Server::bind("127.0.0.1:0", duel_layout(), duel_config()).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (stop, stopped) = oneshot::channel::<()>();

        let players = async {
            let mut answering = RawClient::connect(&addr, "Bob").await;
            let mut silent = RawClient::connect(&addr, "Bob").await;

            let answer = async {
                let mut moves_sent = 0;
                loop {
                    match answering.recv().await {
                        Some(ServerPacket::MoveRequest) => {
                            answering.send_move(Move::Down).await;
                            moves_sent += 1;
                        }
                        Some(ServerPacket::GameResults(results)) => return (results, moves_sent),
                        Some(ServerPacket::SnakeDead { reason }) => panic!("answering snake died: {}", reason),
                        Some(_) => {}
                        None => panic!("answering client was disconnected"),
                    }
                }
            };

            let ignore = async {
                let mut received = Vec::new();
                while let Some(packet) = silent.recv().await {
                    received.push(packet);
                }
                received
            };

            let result = tokio::join!(answer, ignore);
            let _ = stop.send(());
            result
        };

        let serve = async {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        };

        let (((winner, moves_sent), silent_packets), ()) = tokio::join!(players, serve);

        // The survivor is asked once more after the deciding turn.
        assert!(moves_sent >= 1);
        assert_eq!(
            winner,
            GameResults {
                died: false,
                length: 2,
                score: 1000,
                died_on: SURVIVED_TURN,
                rank: 1,
                num_ties: 0,
                new_elo: 1025,
            }
        );

        assert_eq!(silent_packets.first(), Some(&ServerPacket::ConnectionEstablished));
        assert!(silent_packets.contains(&ServerPacket::SnakeDead {
            reason: "Didn't receive move after 2000ms".to_string()
        }));

        let Some(ServerPacket::GameResults(loser)) = silent_packets.last() else {
            panic!("silent client did not get results: {:?}", silent_packets);
        };
        assert!(loser.died);
        assert_eq!(loser.died_on, 0);
        assert_eq!(loser.rank, 2);
        assert_eq!(loser.new_elo, 975);
    }

    /// Two library clients play a full match: one runs off the top edge on
    /// the second turn, the other survives
    #[tokio::test]
    async fn library_clients_finish_a_match() {
        let mut server = Server::bind("127.0.0.1:0", duel_layout(), duel_config()).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (stop, stopped) = oneshot::channel::<()>();

        let players = async {
            let mut first = Client::connect(&addr, "north", Color::new(10, 200, 10), FixedBrain(Move::Up))
                .await
                .unwrap();
            let mut second = Client::connect(&addr, "south", Color::new(200, 10, 10), FixedBrain(Move::Up))
                .await
                .unwrap();

            let (a, b) = tokio::join!(first.run_matches(Some(1)), second.run_matches(Some(1)));
            assert!(a.is_ok() && b.is_ok());

            let _ = stop.send(());
            (first, second)
        };

        let serve = async {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        };

        let ((first, second), ()) = timeout(Duration::from_secs(10), async { tokio::join!(players, serve) })
            .await
            .expect("match did not finish");

        let mut results: Vec<GameResults> = [&first, &second]
            .iter()
            .map(|client| *client.game_state().last_results().expect("no results"))
            .collect();
        results.sort_by_key(|r| r.rank);

        assert_eq!(first.matches_played(), 1);
        assert_eq!(second.matches_played(), 1);

        assert!(!results[0].died);
        assert_eq!(results[0].rank, 1);
        assert!(results[1].died);
        assert_eq!(results[1].died_on, 1);
        assert_eq!(results[0].new_elo + results[1].new_elo, 2000);
        assert!(results[0].new_elo > 1000);
    }
}
