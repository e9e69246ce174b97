//! In-process implementation of [`Broker`].
//!
//! Mirrors the Redis semantics the pipeline relies on: FIFO lists with a
//! blocking pop, fire-and-forget pub/sub that only reaches current
//! subscribers, and plain string sets. Used to run the workers side by side
//! inside one process, most notably in tests.

use super::{Broker, BrokerError, PayloadStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// Per-channel buffer. A subscriber that falls this far behind skips ahead.
const CHANNEL_CAPACITY: usize = 1024;

pub struct MemoryBroker {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    list_pushed: Notify,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
    online: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            list_pushed: Notify::new(),
            channels: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate the broker going away (`false`) or coming back (`true`).
    ///
    /// While offline every operation fails with
    /// [`BrokerError::Unavailable`], including pops that are already
    /// blocked; existing subscriptions are untouched.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.list_pushed.notify_waiters();
    }

    /// Number of live subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Number of items waiting in list `queue`.
    pub async fn queue_len(&self, queue: &str) -> usize {
        self.lists.lock().await.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<(), BrokerError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("memory broker is offline".into()))
        }
    }

    async fn try_pop(&self, queue: &str) -> Option<String> {
        self.lists.lock().await.get_mut(queue)?.pop_back()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        self.ensure_online()
    }

    async fn push(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        self.ensure_online()?;
        self.lists
            .lock()
            .await
            .entry(queue.to_owned())
            .or_default()
            .push_front(payload);
        self.list_pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, BrokerError> {
        loop {
            self.ensure_online()?;
            // Register interest before checking so a push in between is not missed.
            let pushed = self.list_pushed.notified();
            if let Some(payload) = self.try_pop(queue).await {
                return Ok(payload);
            }
            pushed.await;
        }
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
        self.ensure_online()?;
        let channels = self.channels.lock().await;
        let receivers = match channels.get(channel) {
            // `send` only fails when nobody is subscribed.
            Some(sender) => sender.send(payload).unwrap_or(0),
            None => 0,
        };
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError> {
        self.ensure_online()?;
        let receiver = self
            .channels
            .lock()
            .await
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let channel = channel.to_owned();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let payload = match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(%channel, skipped, "Subscription lagged, messages dropped");
                    None
                }
            };
            futures_util::future::ready(payload)
        });
        Ok(stream.boxed())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BrokerError> {
        self.ensure_online()?;
        self.sets
            .lock()
            .await
            .entry(key.to_owned())
            .or_default()
            .extend(members.iter().cloned());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BrokerError> {
        self.ensure_online()?;
        Ok(self
            .sets
            .lock()
            .await
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_list_is_fifo() {
        let broker = MemoryBroker::new();
        broker.push("q", "a".into()).await.unwrap();
        broker.push("q", "b".into()).await.unwrap();
        assert_eq!(broker.blocking_pop("q").await.unwrap(), "a");
        assert_eq!(broker.blocking_pop("q").await.unwrap(), "b");
        assert_eq!(broker.queue_len("q").await, 0);
    }

    #[tokio::test]
    async fn test_blocking_pop_waits_for_push() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.blocking_pop("q").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        broker.push("q", "late".into()).await.unwrap();
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(popped, "late");
    }

    #[tokio::test]
    async fn test_publish_reaches_only_current_subscribers() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.publish("events", "lost".into()).await.unwrap(), 0);

        let mut first = broker.subscribe("events").await.unwrap();
        let mut second = broker.subscribe("events").await.unwrap();
        assert_eq!(broker.subscriber_count("events").await, 2);
        assert_eq!(broker.publish("events", "hello".into()).await.unwrap(), 2);

        assert_eq!(first.next().await.unwrap(), "hello");
        assert_eq!(second.next().await.unwrap(), "hello");

        drop(second);
        assert_eq!(broker.publish("events", "again".into()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lagging_subscription_skips_ahead() {
        let broker = MemoryBroker::new();
        let mut subscription = broker.subscribe("events").await.unwrap();
        for n in 0..CHANNEL_CAPACITY + 5 {
            broker.publish("events", n.to_string()).await.unwrap();
        }

        assert_eq!(subscription.next().await.unwrap(), "5");
        assert_eq!(subscription.next().await.unwrap(), "6");
    }

    #[tokio::test]
    async fn test_sets_deduplicate() {
        let broker = MemoryBroker::new();
        broker
            .set_add("watched", &["btcusdc".to_string(), "ethusdc".to_string()])
            .await
            .unwrap();
        broker.set_add("watched", &["btcusdc".to_string()]).await.unwrap();
        assert_eq!(
            broker.set_members("watched").await.unwrap(),
            vec!["btcusdc".to_string(), "ethusdc".to_string()]
        );
    }

    #[tokio::test]
    async fn test_offline_broker_rejects_operations() {
        let broker = MemoryBroker::new();
        broker.set_online(false);
        assert!(matches!(broker.ping().await, Err(BrokerError::Unavailable(_))));
        assert!(broker.push("q", "x".into()).await.is_err());
        broker.set_online(true);
        assert!(broker.ping().await.is_ok());
    }
}
