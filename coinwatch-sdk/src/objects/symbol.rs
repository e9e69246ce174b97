use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A trading pair such as `btcusdc`.
///
/// Always stored in lower case. The exchange reports `"BTCUSDC"` while
/// clients send whatever they like, so normalising at construction keeps
/// registry keys and watch-set keys comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "CompactString", into = "CompactString")]
pub struct Symbol(CompactString);

impl Symbol {
    pub fn new(raw: &str) -> Self {
        Self(CompactString::from(raw.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Name of the aggregated trade stream for this symbol on the exchange.
    pub fn stream_name(&self) -> String {
        format!("{}@aggTrade", self.0)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CompactString> for Symbol {
    fn from(value: CompactString) -> Self {
        Self::new(&value)
    }
}

impl From<Symbol> for CompactString {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
