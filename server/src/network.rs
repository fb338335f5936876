//! Server network layer: accepts TCP connections and drives the frame loop

use crate::client_manager::ClientManager;
use crate::layout::Layout;
use crate::matchmaker::Matchmaker;
use crate::player::{LocalPlayer, Player, PlayerKind};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Color;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::time::{interval, MissedTickBehavior};

/// Tunables for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Matches to keep running at once
    pub target_games: usize,
    /// Time between two frames of the driving loop
    pub frame_interval: Duration,
    /// File the layout was loaded from, re-read on reload requests
    pub layout_path: Option<PathBuf>,
    /// Interval for logging the leaderboard; `None` disables it
    pub leaderboard_interval: Option<Duration>,
    /// Seed for matchmaking and bots; random when `None`
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            target_games: 2,
            frame_interval: Duration::from_millis(10),
            layout_path: None,
            leaderboard_interval: None,
            seed: None,
        }
    }
}

/// Main server owning the listener, every connection and every match
///
/// All state lives on the task running [`Server::run`]. Each frame polls the
/// connections, lets the matchmaker advance its matches, then flushes
/// whatever the matches produced.
pub struct Server {
    listener: TcpListener,
    clients: ClientManager,
    matchmaker: Matchmaker,
    config: ServerConfig,
    rng: StdRng,
}

impl Server {
    pub async fn bind(addr: &str, layout: Layout, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let matchmaker = Matchmaker::new(config.target_games, layout, StdRng::seed_from_u64(rng.gen()));

        Ok(Server {
            listener,
            clients: ClientManager::new(),
            matchmaker,
            config,
            rng,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// Adds `count` server-side bots to the pool
    pub fn add_bots(&mut self, count: usize) {
        for i in 0..count {
            let color = Color::new(self.rng.gen(), self.rng.gen(), self.rng.gen());
            let bot = LocalPlayer::new(StdRng::seed_from_u64(self.rng.gen()));
            self.matchmaker
                .add_player(Player::new(format!("Bot {}", i + 1), color, PlayerKind::Local(bot)));
        }
    }

    /// Re-reads the layout file, keeping the current layout if that fails
    pub fn reload_layout(&mut self) {
        let Some(path) = self.config.layout_path.clone() else {
            warn!("Reload requested but the server runs the built-in layout");
            return;
        };

        match self.matchmaker.reload_layout(&path) {
            Ok(()) => info!("Reloaded layout from {}", path.display()),
            Err(e) => error!("Keeping current layout, {} failed to load: {}", path.display(), e),
        }
    }

    /// One pass of the driving loop
    pub fn frame(&mut self, now: Instant) {
        self.clients.poll(&mut self.matchmaker, now);
        self.matchmaker.tick(now);
        self.clients.flush(now);
    }

    fn log_leaderboard(&self) {
        let entries = self.matchmaker.leaderboard();
        if entries.is_empty() {
            return;
        }

        info!(
            "Leaderboard ({} connections, {} matches running):",
            self.clients.len(),
            self.matchmaker.active_games()
        );
        for (place, entry) in entries.iter().enumerate() {
            info!("  {:>2}. {:<17} {:>5}", place + 1, entry.name, entry.elo);
        }
    }

    /// Runs until Ctrl+C
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut frame_interval = interval(self.config.frame_interval);
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut leaderboard_interval = interval(self.config.leaderboard_interval.unwrap_or(Duration::from_secs(3600)));
        leaderboard_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        leaderboard_interval.tick().await;

        let mut hangup = reload_signal()?;

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            self.clients.add_client(stream, addr, Instant::now());
                        }
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }

                _ = frame_interval.tick() => {
                    self.frame(Instant::now());
                }

                _ = leaderboard_interval.tick(), if self.config.leaderboard_interval.is_some() => {
                    self.log_leaderboard();
                }

                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading layout");
                    self.reload_layout();
                }
            }
        }

        Ok(())
    }
}

/// Stream of layout reload requests, SIGHUP on unix
#[cfg(unix)]
struct ReloadSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    use tokio::signal::unix::{signal, SignalKind};
    Ok(ReloadSignal(signal(SignalKind::hangup())?))
}

#[cfg(unix)]
impl ReloadSignal {
    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct ReloadSignal;

#[cfg(not(unix))]
fn reload_signal() -> std::io::Result<ReloadSignal> {
    Ok(ReloadSignal)
}

#[cfg(not(unix))]
impl ReloadSignal {
    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}
