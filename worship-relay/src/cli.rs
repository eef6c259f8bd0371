use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use worship_core::{Event, EventId};
use worship_live::{LiveConfig, StaticToken, TokenProvider};

#[derive(Debug, Parser)]
#[command(
    name = "worship-relay",
    about = "Live slide sync for worship events: relay, presenter and screen",
    version
)]
pub struct Cli {
    /// TOML config file; flags override its values.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the relay server.
    Relay(RelayArgs),

    /// Follow an event as a read-only screen.
    View(ViewArgs),

    /// Drive an event's slides from the keyboard.
    Drive(DriveArgs),
}

#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Address to listen on, e.g. 0.0.0.0:9090.
    #[arg(long)]
    pub bind: Option<String>,

    /// Accepted bearer token. Repeat for several; none accepts any token.
    #[arg(long = "allow-token")]
    pub allow_tokens: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Relay URL, e.g. ws://relay.local:9090.
    #[arg(long)]
    pub server: Option<String>,

    /// Bearer token. Falls back to $WORSHIP_TOKEN, re-read on every reconnect.
    #[arg(long)]
    pub token: Option<String>,

    /// Name shown to viewers when this client drives.
    #[arg(long, default_value = "Presenter")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Event to follow. Taken from --event-file when omitted.
    #[arg(long)]
    pub event: Option<EventId>,

    /// Event JSON used to render lyrics instead of raw positions.
    #[arg(long)]
    pub event_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DriveArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Event JSON with the setlist to navigate.
    #[arg(long)]
    pub event_file: PathBuf,
}

/// Reads the token from an environment variable on every connect attempt.
pub struct EnvToken {
    var: &'static str,
}

impl TokenProvider for EnvToken {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(self.var).ok().filter(|t| !t.is_empty())
    }
}

impl ConnectArgs {
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        match &self.token {
            Some(token) => Arc::new(StaticToken(token.clone())),
            None => Arc::new(EnvToken {
                var: "WORSHIP_TOKEN",
            }),
        }
    }

    pub fn apply(&self, config: &mut LiveConfig) {
        if let Some(server) = &self.server {
            config.channel.server_url = server.clone();
        }
    }
}

impl RelayArgs {
    pub fn apply(&self, config: &mut LiveConfig) {
        if let Some(bind) = &self.bind {
            config.relay.bind_addr = bind.clone();
        }
        if !self.allow_tokens.is_empty() {
            config.relay.allowed_tokens = self.allow_tokens.clone();
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<LiveConfig> {
    match path {
        Some(path) => LiveConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(LiveConfig::default()),
    }
}

pub fn load_event(path: &Path) -> Result<Event> {
    Event::load(path).with_context(|| format!("failed to load event {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_flags_override_config() {
        let cli = Cli::parse_from([
            "worship-relay",
            "relay",
            "--bind",
            "0.0.0.0:9191",
            "--allow-token",
            "a",
            "--allow-token",
            "b",
        ]);
        let Commands::Relay(args) = cli.command else {
            panic!("expected relay");
        };
        let mut config = LiveConfig::default();
        args.apply(&mut config);
        assert_eq!(config.relay.bind_addr, "0.0.0.0:9191");
        assert_eq!(config.relay.allowed_tokens, vec!["a", "b"]);
    }

    #[test]
    fn test_relay_without_flags_keeps_config() {
        let cli = Cli::parse_from(["worship-relay", "relay"]);
        let Commands::Relay(args) = cli.command else {
            panic!("expected relay");
        };
        let mut config = LiveConfig::default();
        config.relay.allowed_tokens = vec!["from-file".to_string()];
        args.apply(&mut config);
        assert_eq!(config, {
            let mut expected = LiveConfig::default();
            expected.relay.allowed_tokens = vec!["from-file".to_string()];
            expected
        });
    }

    #[test]
    fn test_view_args() {
        let cli = Cli::parse_from([
            "worship-relay",
            "--config",
            "live.toml",
            "view",
            "--event",
            "42",
            "--server",
            "ws://relay.local:9090",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("live.toml")));
        let Commands::View(args) = cli.command else {
            panic!("expected view");
        };
        assert_eq!(args.event, Some(42));
        assert_eq!(args.connect.name, "Presenter");

        let mut config = LiveConfig::default();
        args.connect.apply(&mut config);
        assert_eq!(config.channel.server_url, "ws://relay.local:9090");
    }

    #[test]
    fn test_explicit_token_is_static() {
        let args = ConnectArgs {
            server: None,
            token: Some("band-42".to_string()),
            name: "Ana".to_string(),
        };
        assert_eq!(args.token_provider().bearer_token().as_deref(), Some("band-42"));
    }

    #[test]
    fn test_drive_requires_event_file() {
        assert!(Cli::try_parse_from(["worship-relay", "drive"]).is_err());
    }
}
