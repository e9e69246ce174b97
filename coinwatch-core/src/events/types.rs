//! Message types that travel through the broker.
//!
//! All of them are ephemeral: the broker keeps no history, and nothing in
//! the pipeline can ask for a message again.

use coinwatch_sdk::objects::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One exchange price observation.
///
/// Produced by the ingest worker onto the tick queue and consumed by
/// exactly one threshold watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub price: Decimal,
}

/// An instruction for the ingest worker, carried on the command queue.
///
/// ```json
/// {"cmd":"watch","symbol":"ethusdc","price_target":"2000"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Start tracking `symbol` on behalf of a client waiting for `price_target`.
    Watch {
        symbol: Symbol,
        price_target: Decimal,
    },
}

impl Command {
    pub fn watch(symbol: Symbol, price_target: Decimal) -> Self {
        Command::Watch {
            symbol,
            price_target,
        }
    }
}

/// A fact broadcast on the event channel.
///
/// Internally tagged on `"event"`:
///
/// ```json
/// {"event":"watched","symbol":"ethusdc","price_target":"2000"}
/// {"event":"price_above_target","symbol":"ethusdc","price_target":"2000","current_price":"2500"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// Ingest has persisted and subscribed to `symbol` for this target.
    Watched {
        symbol: Symbol,
        price_target: Decimal,
    },
    /// A tick for `symbol` traded above `price_target`.
    PriceAboveTarget {
        symbol: Symbol,
        price_target: Decimal,
        current_price: Decimal,
    },
}

impl SystemEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SystemEvent::Watched { .. } => EventKind::Watched,
            SystemEvent::PriceAboveTarget { .. } => EventKind::PriceAboveTarget,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            SystemEvent::Watched { symbol, .. } => symbol,
            SystemEvent::PriceAboveTarget { symbol, .. } => symbol,
        }
    }
}

/// The tag of a [`SystemEvent`], as it appears in the `"event"` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Watched,
    PriceAboveTarget,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Watched, EventKind::PriceAboveTarget];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Watched => "watched",
            EventKind::PriceAboveTarget => "price_above_target",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
