//! Ingest worker configuration.

use coinwatch_sdk::objects::Symbol;

/// Symbols tracked even when nobody asked for them.
pub const DEFAULT_SYMBOLS: [&str; 3] = ["sandusdc", "btcusdc", "ethusdc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Merged into the watch-list on every startup.
    pub default_symbols: Vec<Symbol>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            default_symbols: DEFAULT_SYMBOLS.iter().map(|s| Symbol::new(s)).collect(),
        }
    }
}
