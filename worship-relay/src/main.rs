//! worship-relay — relay server, presenter and screen for live worship events.
//!
//! ```text
//! worship-relay relay --bind 0.0.0.0:9090 --allow-token band-42
//! worship-relay drive --event-file sunday.json --token band-42 --name Ana
//! worship-relay view  --event-file sunday.json --token band-42
//! ```

mod cli;
mod drive;
mod view;

use anyhow::Result;
use clap::Parser;
use log::info;
use worship_live::{LiveConfig, RelayServer};

use cli::{Cli, Commands, RelayArgs};

async fn run_relay(args: RelayArgs, mut config: LiveConfig) -> Result<()> {
    args.apply(&mut config);
    if config.relay.allowed_tokens.is_empty() {
        log::warn!("No allowed tokens configured, accepting any token");
    }
    let server = RelayServer::new(config.relay);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await;
            info!(
                "Shutting down: {} connections, {} messages, {} rejected joins",
                stats.total_connections, stats.total_messages, stats.rejected_joins
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Relay(args) => run_relay(args, config).await,
        Commands::View(args) => view::run_view(args, config).await,
        Commands::Drive(args) => drive::run_drive(args, config).await,
    }
}
