use clap::Parser;
use client::brain::RandomSafeBrain;
use client::network::Client;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Color, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot client for the snake arena")]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Name shown on the leaderboard
    #[arg(short = 'n', long, default_value = "sidewinder")]
    name: String,

    /// Snake color as `r,g,b`
    #[arg(short = 'c', long, default_value = "40,200,90")]
    color: Color,

    /// Seed for the move picker
    #[arg(long)]
    seed: Option<u64>,

    /// Disconnect after this many matches
    #[arg(short = 'm', long)]
    matches: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("Connecting to {} as {} ({})", args.server, args.name, args.color);
    let mut client = Client::connect(&args.server, &args.name, args.color, RandomSafeBrain::new(rng)).await?;

    client.run_matches(args.matches).await?;
    info!("Played {} matches", client.matches_played());

    Ok(())
}
