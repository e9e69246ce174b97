//! Validated runtime configuration.
//!
//! The per-worker types are defined in `coinwatch-core::config`; this module
//! groups them with the process-level settings.

pub use coinwatch_core::config::{IngestSettings, PipelineNames};

use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub redis_uri: String,
    pub dependency_retry: Duration,
    pub pipeline: PipelineNames,
    pub listen: SocketAddr,
    pub exchange_url: Url,
    pub ingest: IngestSettings,
}
