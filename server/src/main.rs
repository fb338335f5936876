use clap::Parser;
use log::info;
use server::layout::Layout;
use server::network::{Server, ServerConfig};
use shared::DEFAULT_PORT;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn-based multiplayer snake server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of matches to run at the same time
    #[arg(short, long, default_value_t = 2)]
    games: usize,

    /// JSON board layout; the built-in 20x20 layout is used when omitted
    #[arg(short, long)]
    layout: Option<PathBuf>,

    /// Milliseconds between two frames of the server loop
    #[arg(long, default_value_t = 10)]
    frame_ms: u64,

    /// Seed for matchmaking, food and bots
    #[arg(long)]
    seed: Option<u64>,

    /// Server-side bots to add to the pool
    #[arg(short, long, default_value_t = 0)]
    bots: usize,

    /// Seconds between leaderboard prints, 0 to disable
    #[arg(long, default_value_t = 60)]
    leaderboard_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let layout = match &args.layout {
        Some(path) => Layout::load(path)?,
        None => Layout::default(),
    };
    info!(
        "Layout: {}x{}, {} snakes, {} food",
        layout.num_rows,
        layout.num_cols,
        layout.num_snakes(),
        layout.num_food
    );

    let config = ServerConfig {
        target_games: args.games,
        frame_interval: Duration::from_millis(args.frame_ms.max(1)),
        layout_path: args.layout.clone(),
        leaderboard_interval: (args.leaderboard_secs > 0).then(|| Duration::from_secs(args.leaderboard_secs)),
        seed: args.seed,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, layout, config).await?;
    server.add_bots(args.bots);

    server.run().await?;

    Ok(())
}
