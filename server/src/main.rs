use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::{DEFAULT_PATH, DEFAULT_PORT, PICKUP_CAP};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path the WebSocket endpoint is served on
    #[arg(long, default_value = DEFAULT_PATH)]
    path: String,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    /// Maximum number of pickups alive at once
    #[arg(long, default_value_t = PICKUP_CAP)]
    pickup_cap: usize,

    /// Milliseconds between pickup spawns
    #[arg(long, default_value_t = 1000)]
    pickup_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig::new(&args.host, args.port, &args.path, args.tick_rate)
        .with_pickups(args.pickup_cap, Duration::from_millis(args.pickup_interval_ms));

    info!(
        "Starting server on {} ({} Hz, up to {} pickups)",
        config.bind_addr, args.tick_rate, config.pickup_cap
    );

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
