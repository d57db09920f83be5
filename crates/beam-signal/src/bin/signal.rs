//! Beam Coordination Service
//!
//! Signaling server that bootstraps direct peer-to-peer file transfers:
//! rooms, nicknames, membership fan-out. All state is in-memory.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 3000, 10 minute room inactivity window)
//! beam-signal
//!
//! # Explicit port and a shorter window
//! beam-signal --port 8080 --room-idle-secs 120
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beam_core::Config;
use beam_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "beam-signal")]
#[command(about = "Beam coordination service for peer discovery")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Configuration file (defaults to the per-user config path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Room inactivity window in seconds (overrides config)
    #[arg(long)]
    room_idle_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if let Some(secs) = args.room_idle_secs {
        config.signal.room_idle_secs = secs;
    }

    let addr = SocketAddr::new(config.signal.bind, config.signal.port);

    info!("Starting Beam coordination service");
    info!("Listening on {}", addr);
    info!(
        "Room inactivity window: {}s",
        config.signal.room_idle_secs
    );

    let server = SignalServer::new(&config.signal);
    server.serve(addr).await?;

    Ok(())
}
