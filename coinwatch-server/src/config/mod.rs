//! Configuration module for coinwatch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{IngestSettings, PipelineNames, RuntimeConfig};
use coinwatch_sdk::objects::Symbol;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values given on the command line or through the environment.
///
/// Anything set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub redis_uri: Option<String>,
    pub dependency_retry_secs: Option<u64>,
    pub listen: Option<SocketAddr>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, or fall back to defaults if there is none
    /// 2. Apply CLI / environment overrides
    /// 3. Validate the result
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let file_config = if self.config_path.exists() {
            let config_content = std::fs::read_to_string(&self.config_path)?;
            toml::from_str(&config_content)?
        } else {
            tracing::info!(
                path = %self.config_path.display(),
                "No config file found, using defaults"
            );
            FileConfig::default()
        };
        self.resolve(file_config)
    }

    fn resolve(&self, mut file_config: FileConfig) -> Result<RuntimeConfig, ConfigError> {
        if let Some(uri) = &self.overrides.redis_uri {
            file_config.broker.uri = uri.clone();
        }
        if let Some(secs) = self.overrides.dependency_retry_secs {
            file_config.broker.dependency_retry_secs = secs;
        }
        if let Some(listen) = self.overrides.listen {
            file_config.api.listen = listen;
        }

        self.validate(&file_config)?;
        let exchange_url = parse_exchange_url(&file_config.ingest.exchange_url)?;

        let pipeline = file_config.pipeline;
        Ok(RuntimeConfig {
            redis_uri: file_config.broker.uri,
            dependency_retry: Duration::from_secs(file_config.broker.dependency_retry_secs),
            pipeline: PipelineNames {
                tick_queue: pipeline.tick_queue.into(),
                command_queue: pipeline.command_queue.into(),
                event_channel: pipeline.event_channel.into(),
                watch_list_key: pipeline.watch_list_key.into(),
            },
            listen: file_config.api.listen,
            exchange_url,
            ingest: IngestSettings {
                default_symbols: file_config
                    .ingest
                    .default_symbols
                    .iter()
                    .map(|s| Symbol::new(s))
                    .collect(),
            },
        })
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.broker.dependency_retry_secs == 0 {
            return Err(ConfigError::ValidationError(
                "dependency retry interval must be at least one second".to_string(),
            ));
        }
        let names = [
            ("tick_queue", &config.pipeline.tick_queue),
            ("command_queue", &config.pipeline.command_queue),
            ("event_channel", &config.pipeline.event_channel),
            ("watch_list_key", &config.pipeline.watch_list_key),
        ];
        for (field, value) in names {
            if value.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pipeline.{field} must not be empty"
                )));
            }
        }
        if config.pipeline.tick_queue == config.pipeline.command_queue {
            return Err(ConfigError::ValidationError(
                "tick and command queues must be different lists".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_exchange_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::ValidationError(format!("invalid exchange url {raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::ValidationError(format!(
            "exchange url must use ws or wss, not {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(overrides: Overrides) -> ConfigLoader {
        ConfigLoader::new("/nonexistent/coinwatch.toml", overrides)
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = loader(Overrides::default()).load().unwrap();
        assert_eq!(config.redis_uri, "redis://redis");
        assert_eq!(config.dependency_retry, Duration::from_secs(1));
        assert_eq!(config.pipeline, PipelineNames::default());
        assert_eq!(config.listen.port(), 9090);
        assert_eq!(config.exchange_url.host_str(), Some("stream.binance.com"));
        assert_eq!(config.ingest, IngestSettings::default());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file_config: FileConfig = toml::from_str(
            r#"
[broker]
uri = "redis://from-file"
dependency_retry_secs = 3
"#,
        )
        .unwrap();
        let config = loader(Overrides {
            redis_uri: Some("redis://from-env".to_string()),
            dependency_retry_secs: None,
            listen: Some("127.0.0.1:4000".parse().unwrap()),
        })
        .resolve(file_config)
        .unwrap();

        assert_eq!(config.redis_uri, "redis://from-env");
        assert_eq!(config.dependency_retry, Duration::from_secs(3));
        assert_eq!(config.listen.port(), 4000);
    }

    #[test]
    fn test_default_symbols_are_normalised() {
        let file_config: FileConfig =
            toml::from_str("[ingest]\ndefault_symbols = [\"BTCUSDC\"]\n").unwrap();
        let config = loader(Overrides::default()).resolve(file_config).unwrap();
        assert_eq!(config.ingest.default_symbols, vec![Symbol::new("btcusdc")]);
    }

    #[test]
    fn test_validation_errors() {
        let zero_retry = loader(Overrides {
            dependency_retry_secs: Some(0),
            ..Overrides::default()
        })
        .resolve(FileConfig::default());
        assert!(matches!(zero_retry, Err(ConfigError::ValidationError(_))));

        let mut same_queue = FileConfig::default();
        same_queue.pipeline.command_queue = same_queue.pipeline.tick_queue.clone();
        assert!(matches!(
            loader(Overrides::default()).resolve(same_queue),
            Err(ConfigError::ValidationError(_))
        ));

        let mut http_exchange = FileConfig::default();
        http_exchange.ingest.exchange_url = "https://stream.binance.com".to_string();
        assert!(matches!(
            loader(Overrides::default()).resolve(http_exchange),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
