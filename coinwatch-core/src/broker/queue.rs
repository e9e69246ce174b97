//! Typed FIFO queue over a broker list.

use super::{BrokerError, SharedBroker};
use compact_str::CompactString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// A named broker list carrying JSON-encoded `T`.
///
/// Consumption is at-most-once: an item is gone from the broker as soon as
/// [`dequeue`](RemoteQueue::dequeue) returns it.
pub struct RemoteQueue<T> {
    broker: SharedBroker,
    name: CompactString,
    _item: PhantomData<fn() -> T>,
}

impl<T> RemoteQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(broker: SharedBroker, name: impl Into<CompactString>) -> Self {
        Self {
            broker,
            name: name.into(),
            _item: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serialize `item` and push it onto the queue. Never waits for a consumer.
    pub async fn enqueue(&self, item: &T) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(item)?;
        self.broker.push(&self.name, payload).await
    }

    /// Wait for the oldest item and decode it.
    ///
    /// A payload that does not decode is already removed from the broker
    /// when [`BrokerError::Codec`] is returned.
    pub async fn dequeue(&self) -> Result<T, BrokerError> {
        let payload = self.broker.blocking_pop(&self.name).await?;
        Ok(serde_json::from_str(&payload)?)
    }
}

impl<T> Clone for RemoteQueue<T> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            name: self.name.clone(),
            _item: PhantomData,
        }
    }
}
