//! Configuration types for CoinWatch workers.
//!
//! These types represent the validated runtime configuration used by the
//! processors. The actual config loading/parsing is handled by the server
//! crate.

mod ingest;
mod pipeline;

pub use ingest::{DEFAULT_SYMBOLS, IngestSettings};
pub use pipeline::PipelineNames;
