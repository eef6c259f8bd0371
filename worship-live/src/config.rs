//! TOML configuration for the relay and live channels.
//!
//! ```toml
//! # worship-live.toml
//! [relay]
//! bind_addr = "0.0.0.0:9090"
//! allowed_tokens = ["band-42"]
//!
//! [channel]
//! server_url = "ws://relay.local:9090"
//! live_message_ttl_ms = 8000
//!
//! [channel.reconnect]
//! max_attempts = 20
//! ```
//!
//! Every table and key is optional; missing values take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::ChannelConfig;
use crate::server::ServerConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub relay: ServerConfig,
    pub channel: ChannelConfig,
}

impl LiveConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = LiveConfig::from_toml_str("").unwrap();
        assert_eq!(config, LiveConfig::default());
        assert_eq!(config.channel.reconnect.max_attempts, 10);
    }

    #[test]
    fn test_partial_tables_keep_other_defaults() {
        let config = LiveConfig::from_toml_str(
            r#"
            [relay]
            bind_addr = "0.0.0.0:9191"
            allowed_tokens = ["band-42"]

            [channel]
            live_message_ttl_ms = 8000

            [channel.reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.bind_addr, "0.0.0.0:9191");
        assert_eq!(config.relay.allowed_tokens, vec!["band-42".to_string()]);
        assert_eq!(config.relay.broadcast_capacity, 256);
        assert_eq!(config.channel.live_message_ttl_ms, 8000);
        assert_eq!(config.channel.settle_delay_ms, 250);
        assert_eq!(config.channel.reconnect.max_attempts, 3);
        assert_eq!(config.channel.reconnect.initial_backoff_ms, 500);
    }

    #[test]
    fn test_type_mismatch_is_toml_error() {
        let err = LiveConfig::from_toml_str("[relay]\nmax_peers_per_room = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[channel]\nserver_url = \"ws://relay.local:9090\"").unwrap();

        let config = LiveConfig::load(file.path()).unwrap();
        assert_eq!(config.channel.server_url, "ws://relay.local:9090");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LiveConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
