//! TOML file configuration structures.
//!
//! These structs directly map to the `coinwatch.toml` file format. Every
//! section and every field is optional.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub broker: BrokerConfig,
    pub pipeline: PipelineConfig,
    pub api: ApiConfig,
    pub ingest: IngestConfig,
}

/// Broker connection section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Redis connection URI.
    pub uri: String,
    /// Seconds between broker availability checks at startup.
    pub dependency_retry_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            uri: "redis://redis".to_string(),
            dependency_retry_secs: 1,
        }
    }
}

/// Broker object names. Must match across every process of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tick_queue: String,
    pub command_queue: String,
    pub event_channel: String,
    pub watch_list_key: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_queue: "price".to_string(),
            command_queue: "ingest_commands".to_string(),
            event_channel: "events".to_string(),
            watch_list_key: "watched_symbols".to_string(),
        }
    }
}

/// Client-facing API section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:9090").
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

/// Ingest worker section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// WebSocket endpoint of the exchange trade stream.
    pub exchange_url: String,
    /// Symbols merged into the watch-list on every startup.
    pub default_symbols: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            exchange_url: "wss://stream.binance.com:9443/ws/aggTrade".to_string(),
            default_symbols: coinwatch_core::config::DEFAULT_SYMBOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[broker]
uri = "redis://127.0.0.1:6379"
dependency_retry_secs = 5

[pipeline]
tick_queue = "ticks"
event_channel = "coinwatch-events"

[api]
listen = "127.0.0.1:3000"

[ingest]
exchange_url = "wss://example.com/ws"
default_symbols = ["btcusdc"]
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.broker.uri, "redis://127.0.0.1:6379");
        assert_eq!(config.broker.dependency_retry_secs, 5);
        assert_eq!(config.pipeline.tick_queue, "ticks");
        assert_eq!(config.pipeline.command_queue, "ingest_commands");
        assert_eq!(config.pipeline.event_channel, "coinwatch-events");
        assert_eq!(config.api.listen.port(), 3000);
        assert_eq!(config.ingest.default_symbols, vec!["btcusdc"]);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.broker.uri, "redis://redis");
        assert_eq!(config.api.listen.port(), 9090);
        assert_eq!(
            config.ingest.default_symbols,
            vec!["sandusdc", "btcusdc", "ethusdc"]
        );
    }

    #[test]
    fn test_invalid_listen_addr_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str("[api]\nlisten = \"nowhere\"\n");
        assert!(result.is_err());
    }
}
