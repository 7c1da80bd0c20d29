use clap::Parser;
use client::network::{Client, ClientConfig};
use client::walker::Walker;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:10002")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long)]
    room: String,

    /// Starting latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    latitude: f64,

    /// Starting longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    longitude: f64,

    /// Reported accuracy radius in meters
    #[arg(short = 'a', long, default_value = "10")]
    accuracy: f64,

    /// Milliseconds between position refreshes
    #[arg(short = 'i', long, default_value = "2000")]
    interval_ms: u64,

    /// Maximum simulated drift per refresh, in meters
    #[arg(short = 'j', long, default_value = "0")]
    jitter_m: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Joining room {} via {}", args.room, args.server);

    let config = ClientConfig {
        server_url: args.server,
        room_id: args.room,
        refresh_interval: Duration::from_millis(args.interval_ms.max(1)),
    };
    let walker = Walker::new(args.latitude, args.longitude, args.accuracy, args.jitter_m);

    Client::new(config, walker)
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, leaving room...");
        })
        .await
}
