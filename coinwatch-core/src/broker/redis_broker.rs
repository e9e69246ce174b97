//! Redis implementation of [`Broker`].
//!
//! Lists map to `LPUSH` / `BRPOP`, channels to `PUBLISH` / `SUBSCRIBE` and
//! sets to `SADD` / `SMEMBERS`.

use super::{Broker, BrokerError, PayloadStream};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::Client;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Server-side timeout of one `BRPOP` round trip, in seconds.
///
/// [`RedisBroker::blocking_pop`] re-issues the command until an item
/// arrives, so this only bounds how long a single request stays open.
const BLOCKING_POP_SLICE_SECS: f64 = 0.25;

/// Redis-backed broker.
///
/// Connections are opened lazily so a process can be constructed before
/// Redis is reachable and wait for it with the dependency probe.
pub struct RedisBroker {
    client: Client,
    /// Shared, auto-reconnecting connection for non-blocking commands.
    commands: OnceCell<ConnectionManager>,
    /// Dedicated connection for `BRPOP`, which would otherwise stall every
    /// other command multiplexed onto the same connection.
    blocking: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Create a broker for `url` (e.g. `redis://redis:6379`).
    ///
    /// Only the URL is validated here; no connection is made.
    pub fn open(url: &str) -> Result<Self, BrokerError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            commands: OnceCell::new(),
            blocking: Mutex::new(None),
        })
    }

    async fn commands(&self) -> Result<ConnectionManager, BrokerError> {
        let manager = self
            .commands
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.commands().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn push(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
        let mut conn = self.commands().await?;
        let _: usize = redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn blocking_pop(&self, queue: &str) -> Result<String, BrokerError> {
        let mut slot = self.blocking.lock().await;
        loop {
            let mut conn = match slot.take() {
                Some(conn) => conn,
                None => {
                    debug!(queue, "Opening dedicated connection for blocking pops");
                    self.client.get_multiplexed_async_connection().await?
                }
            };

            let popped: redis::RedisResult<Option<(String, String)>> = redis::cmd("BRPOP")
                .arg(queue)
                .arg(BLOCKING_POP_SLICE_SECS)
                .query_async(&mut conn)
                .await;

            // A failed connection is dropped so the next call starts clean.
            match popped {
                Ok(Some((_, payload))) => {
                    *slot = Some(conn);
                    return Ok(payload);
                }
                Ok(None) => *slot = Some(conn),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
        let mut conn = self.commands().await?;
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "Subscribed to channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Dropping non-text pub/sub payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BrokerError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.commands().await?;
        let _: usize = redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BrokerError> {
        let mut conn = self.commands().await?;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_invalid_url() {
        assert!(matches!(
            RedisBroker::open("not a url"),
            Err(BrokerError::Unavailable(_))
        ));
    }

    #[test]
    fn test_open_does_not_connect() {
        // Nothing listens on port 1; construction must still succeed.
        assert!(RedisBroker::open("redis://127.0.0.1:1").is_ok());
    }
}
