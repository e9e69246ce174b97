//! Typed pub/sub channel for [`SystemEvent`]s.

use super::{BrokerError, PayloadStream, SharedBroker};
use crate::events::{EventKind, SystemEvent};
use async_trait::async_trait;
use compact_str::CompactString;
use futures_util::StreamExt;
use tracing::{trace, warn};

/// A named broadcast channel.
///
/// Delivery is fire-and-forget: an event reaches the subscriptions that
/// exist when it is published and is then gone.
#[derive(Clone)]
pub struct EventBus {
    broker: SharedBroker,
    channel: CompactString,
}

impl EventBus {
    pub fn new(broker: SharedBroker, channel: impl Into<CompactString>) -> Self {
        Self {
            broker,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish `event` and return how many listeners received it.
    ///
    /// Zero is not an error, but the event is lost.
    pub async fn publish(&self, event: &SystemEvent) -> Result<usize, BrokerError> {
        let payload = serde_json::to_string(event)?;
        let receivers = self.broker.publish(&self.channel, payload).await?;
        if receivers == 0 {
            warn!(
                channel = %self.channel,
                event = %event.kind(),
                symbol = %event.symbol(),
                "Event was not received by any listener"
            );
        }
        Ok(receivers)
    }

    pub async fn subscribe(&self) -> Result<EventSubscription, BrokerError> {
        let payloads = self.broker.subscribe(&self.channel).await?;
        Ok(EventSubscription {
            channel: self.channel.clone(),
            payloads,
        })
    }
}

/// A live subscription to an [`EventBus`] channel.
pub struct EventSubscription {
    channel: CompactString,
    payloads: PayloadStream,
}

impl EventSubscription {
    /// Wait for the next event with a known tag.
    ///
    /// Frames with an unknown tag are skipped silently; frames with a known
    /// tag that fail to decode are logged and skipped. Returns
    /// [`BrokerError::SubscriptionClosed`] once the underlying stream ends.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Result<SystemEvent, BrokerError> {
        loop {
            let Some(payload) = self.payloads.next().await else {
                return Err(BrokerError::SubscriptionClosed(self.channel.clone()));
            };
            match decode_event(&payload) {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => trace!(channel = %self.channel, %payload, "Ignoring unrecognised event"),
                Err(e) => warn!(
                    channel = %self.channel,
                    %payload,
                    error = %e,
                    "Dropping malformed event"
                ),
            }
        }
    }
}

/// `Ok(None)` when the payload carries no known `"event"` tag.
fn decode_event(payload: &str) -> Result<Option<SystemEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let recognised = value
        .get("event")
        .and_then(serde_json::Value::as_str)
        .and_then(EventKind::from_tag)
        .is_some();
    if !recognised {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some)
}

/// A component that reacts to a fixed set of event kinds.
///
/// `on_event` sees only kinds listed in [`INTERESTS`](EventListener::INTERESTS)
/// when driven through [`dispatch`]. Its `match` over [`SystemEvent`] is
/// exhaustive, so there is no such thing as a recognised event without a
/// handler.
#[async_trait]
pub trait EventListener: Send {
    const INTERESTS: &'static [EventKind];

    type Error: Send;

    async fn on_event(&mut self, event: SystemEvent) -> Result<(), Self::Error>;
}

/// Hand `event` to `listener` if it is one of the listener's interests.
///
/// An error from the listener is returned as-is; callers treat it as fatal
/// for their listen loop.
pub async fn dispatch<L: EventListener>(
    listener: &mut L,
    event: SystemEvent,
) -> Result<(), L::Error> {
    if !L::INTERESTS.contains(&event.kind()) {
        trace!(event = %event.kind(), "Event outside listener interests");
        return Ok(());
    }
    listener.on_event(event).await
}
