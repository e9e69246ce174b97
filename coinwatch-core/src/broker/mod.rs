//! Shared broker primitives.
//!
//! Every worker talks to the others only through three primitives of one
//! shared broker:
//!
//! - a named FIFO list with push / blocking pop ([`RemoteQueue`])
//! - a named pub/sub channel ([`EventBus`])
//! - a named durable set ([`WatchListStore`])
//!
//! The [`Broker`] trait is the raw, string-payload seam. [`RedisBroker`] is
//! the production backend; [`MemoryBroker`] reproduces the same semantics
//! in-process.

pub mod bus;
pub mod memory;
pub mod queue;
pub mod redis_broker;
pub mod watch_list;

pub use bus::{EventBus, EventListener, EventSubscription, dispatch};
pub use memory::MemoryBroker;
pub use queue::RemoteQueue;
pub use redis_broker::RedisBroker;
pub use watch_list::WatchListStore;

use async_trait::async_trait;
use compact_str::CompactString;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;

/// Raw messages received on a pub/sub subscription.
pub type PayloadStream = BoxStream<'static, String>;

/// A broker handle shared by every component of a process.
pub type SharedBroker = Arc<dyn Broker>;

/// Errors surfaced by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached or rejected the command.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A payload did not match the expected shape.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The subscription stream ended.
    #[error("subscription to channel `{0}` closed")]
    SubscriptionClosed(CompactString),
}

impl From<redis::RedisError> for BrokerError {
    fn from(e: redis::RedisError) -> Self {
        BrokerError::Unavailable(e.to_string())
    }
}

/// String-payload access to the shared broker.
///
/// Lists push at the head and pop at the tail, so each named list behaves
/// as a FIFO. Published messages reach only the subscriptions that exist at
/// publish time.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Check that the broker is reachable and accepting commands.
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Push `payload` to the head of list `queue`.
    async fn push(&self, queue: &str, payload: String) -> Result<(), BrokerError>;

    /// Pop from the tail of list `queue`, waiting until an item exists.
    async fn blocking_pop(&self, queue: &str) -> Result<String, BrokerError>;

    /// Publish `payload` on `channel`.
    ///
    /// Returns the number of subscriptions that received it.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError>;

    /// Subscribe to `channel`.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError>;

    /// Add `members` to set `key`.
    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BrokerError>;

    /// All members of set `key`.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, BrokerError>;
}
