//! NotificationRouter processor.
//!
//! The NotificationRouter is responsible for:
//! - Receiving client registrations from connection handlers
//! - Recording them in the `ClientRegistry`
//! - Enqueuing `Command::Watch` for the ingest worker
//! - Receiving `PriceAboveTarget` events and notifying every registered
//!   connection, then forgetting the target
//!
//! Registrations are accepted optimistically: the caller gets `Ok` as soon
//! as the router has the request, long before ingest has acted on it.

use super::ProcessorError;
use crate::broker::{BrokerError, EventBus, EventListener, EventSubscription, RemoteQueue, dispatch};
use crate::events::{
    Command, EventKind, OutboundSender, RegistrationReceiver, RegistrationSender, SystemEvent,
    registration_channel,
};
use crate::utils::shutdown_requested;
use async_trait::async_trait;
use coinwatch_sdk::objects::{Notification, Symbol};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long a notification waits for room in one connection's buffer.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RouterError {
    /// The router task is gone.
    #[error("notification router is not running")]
    Closed,
}

/// Identifies one client connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where to deliver notifications for one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    outbound: OutboundSender,
}

impl ConnectionHandle {
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            id: ConnectionId::new(),
            outbound,
        }
    }

    /// Queue `text` for this connection. Returns `false` if it was not
    /// delivered to the connection's outbound buffer.
    async fn notify(&self, text: String) -> bool {
        match self.outbound.send_timeout(text, NOTIFY_TIMEOUT).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Failed to notify connection");
                false
            }
        }
    }
}

/// A client asking to hear about `symbol` trading above `price_target`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub symbol: Symbol,
    pub price_target: Decimal,
    pub connection: ConnectionHandle,
}

/// Connections waiting on each `(symbol, price_target)`.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    entries: HashMap<(Symbol, Decimal), HashMap<ConnectionId, ConnectionHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if this connection was already registered for the pair.
    pub fn register(
        &mut self,
        symbol: Symbol,
        price_target: Decimal,
        connection: ConnectionHandle,
    ) -> bool {
        self.entries
            .entry((symbol, price_target))
            .or_default()
            .insert(connection.id, connection)
            .is_none()
    }

    /// Remove the pair and hand back whoever was waiting on it.
    pub fn evict(&mut self, symbol: &Symbol, price_target: &Decimal) -> Vec<ConnectionHandle> {
        self.entries
            .remove(&(symbol.clone(), *price_target))
            .map(|connections| connections.into_values().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, symbol: &Symbol, price_target: &Decimal) -> bool {
        self.entries.contains_key(&(symbol.clone(), *price_target))
    }

    /// Number of connections registered for the pair.
    pub fn connections(&self, symbol: &Symbol, price_target: &Decimal) -> usize {
        self.entries
            .get(&(symbol.clone(), *price_target))
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Number of registered pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cloneable front door to a running [`NotificationRouter`].
#[derive(Clone)]
pub struct RouterHandle {
    registrations_tx: RegistrationSender,
}

impl RouterHandle {
    pub async fn register(
        &self,
        symbol: Symbol,
        price_target: Decimal,
        connection: ConnectionHandle,
    ) -> Result<(), RouterError> {
        self.registrations_tx
            .send(Registration {
                symbol,
                price_target,
                connection,
            })
            .await
            .map_err(|_| RouterError::Closed)
    }
}

/// Owns the client registry of one API process.
pub struct NotificationRouter {
    registry: ClientRegistry,
    bus: EventBus,
    commands: RemoteQueue<Command>,
    registrations_rx: RegistrationReceiver,
}

impl NotificationRouter {
    /// Create a new NotificationRouter and the handle used to reach it.
    ///
    /// # Arguments
    ///
    /// * `bus` - Event bus to receive `PriceAboveTarget` from
    /// * `commands` - Queue the ingest worker takes commands from
    pub fn new(bus: EventBus, commands: RemoteQueue<Command>) -> (Self, RouterHandle) {
        let (registrations_tx, registrations_rx) = registration_channel();
        let router = Self {
            registry: ClientRegistry::new(),
            bus,
            commands,
            registrations_rx,
        };
        (router, RouterHandle { registrations_tx })
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Run the NotificationRouter until shutdown or a broker failure.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), ProcessorError> {
        let mut subscription = self.bus.subscribe().await?;
        info!(
            channel = %self.bus.channel(),
            queue = %self.commands.name(),
            "NotificationRouter started"
        );

        let result = self.listen(&mut subscription, &mut shutdown_rx).await;
        match &result {
            Ok(()) => info!("NotificationRouter shutdown complete"),
            Err(e) => error!(error = %e, "NotificationRouter stopped"),
        }
        result
    }

    async fn listen(
        &mut self,
        subscription: &mut EventSubscription,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(shutdown_rx) => {
                    info!("NotificationRouter received shutdown signal");
                    return Ok(());
                }

                event = subscription.next() => {
                    if let Err(e) = dispatch(self, event?).await {
                        match e {}
                    }
                }

                registration = self.registrations_rx.recv() => {
                    let Some(registration) = registration else {
                        info!("All router handles dropped");
                        return Ok(());
                    };
                    self.register(registration).await?;
                }
            }
        }
    }

    /// Record the registration, then ask ingest to start watching.
    async fn register(&mut self, registration: Registration) -> Result<(), BrokerError> {
        let Registration {
            symbol,
            price_target,
            connection,
        } = registration;
        debug!(%symbol, %price_target, connection = %connection.id, "Registering client");

        self.registry
            .register(symbol.clone(), price_target, connection);
        self.commands
            .enqueue(&Command::watch(symbol, price_target))
            .await
    }

    /// Forget the pair and notify everyone who was waiting on it.
    ///
    /// The entry is gone afterwards whether or not anyone is notified.
    /// Delivery runs in its own task so a slow connection never holds up
    /// registrations or later events.
    fn notify_crossed(&mut self, notification: Notification) {
        let connections = self
            .registry
            .evict(&notification.symbol, &notification.price_target);
        if connections.is_empty() {
            debug!(
                symbol = %notification.symbol,
                price_target = %notification.price_target,
                "No connections waiting on target"
            );
            return;
        }

        tokio::spawn(deliver(notification, connections));
    }
}

async fn deliver(notification: Notification, connections: Vec<ConnectionHandle>) {
    let text = notification.to_string();
    let delivered = join_all(
        connections
            .iter()
            .map(|connection| connection.notify(text.clone())),
    )
    .await
    .into_iter()
    .filter(|delivered| *delivered)
    .count();

    info!(
        symbol = %notification.symbol,
        price_target = %notification.price_target,
        current_price = %notification.current_price,
        delivered,
        registered = connections.len(),
        "Notified clients"
    );
}

#[async_trait]
impl EventListener for NotificationRouter {
    const INTERESTS: &'static [EventKind] = &[EventKind::PriceAboveTarget];

    type Error = Infallible;

    async fn on_event(&mut self, event: SystemEvent) -> Result<(), Infallible> {
        match event {
            SystemEvent::PriceAboveTarget {
                symbol,
                price_target,
                current_price,
            } => {
                self.notify_crossed(Notification {
                    symbol,
                    price_target,
                    current_price,
                });
            }
            SystemEvent::Watched { .. } => {}
        }
        Ok(())
    }
}
