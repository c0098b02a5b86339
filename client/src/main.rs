use clap::Parser;
use client::input::Autopilot;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080/ws")]
    server: String,

    /// Client tick rate (updates per second)
    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    /// Disconnect after this many seconds; runs until the server goes away if omitted
    #[arg(short, long)]
    duration_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(&args.server, args.tick_rate, Box::new(Autopilot::new())).await?;

    tokio::select! {
        result = client.run(args.duration_secs.map(Duration::from_secs)) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting...");
        }
    }

    info!("Final score: {}", client.replica().local.score);

    Ok(())
}
