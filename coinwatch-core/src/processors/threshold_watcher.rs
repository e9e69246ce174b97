//! ThresholdWatcher processor.
//!
//! The ThresholdWatcher is responsible for:
//! - Projecting `Watched` / `PriceAboveTarget` events into a local `WatchSet`
//! - Receiving `Tick`s from the tick queue
//! - Publishing `PriceAboveTarget` for every target a tick trades above
//!
//! There is no debouncing. A target keeps firing on every tick above it until
//! its own `PriceAboveTarget` comes back over the bus and removes it, so
//! clients get at least one notification, possibly several.

use super::ProcessorError;
use crate::broker::{
    BrokerError, EventBus, EventListener, EventSubscription, RemoteQueue, dispatch,
};
use crate::events::{EventKind, SystemEvent, Tick, TickReceiver, TickSender, tick_channel};
use crate::utils::shutdown_requested;
use async_trait::async_trait;
use coinwatch_sdk::objects::Symbol;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Price targets currently being watched, per symbol.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSet {
    targets: HashMap<Symbol, BTreeSet<Decimal>>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the pair was already present.
    pub fn insert(&mut self, symbol: Symbol, price_target: Decimal) -> bool {
        self.targets.entry(symbol).or_default().insert(price_target)
    }

    /// Returns `false` if the pair was not present.
    pub fn remove(&mut self, symbol: &Symbol, price_target: &Decimal) -> bool {
        let Some(targets) = self.targets.get_mut(symbol) else {
            return false;
        };
        let removed = targets.remove(price_target);
        if targets.is_empty() {
            self.targets.remove(symbol);
        }
        removed
    }

    pub fn contains(&self, symbol: &Symbol, price_target: &Decimal) -> bool {
        self.targets
            .get(symbol)
            .is_some_and(|targets| targets.contains(price_target))
    }

    /// Targets of `tick.symbol` strictly below `tick.price`, in ascending order.
    ///
    /// The result is a copy, so callers may mutate the set while acting on it.
    pub fn crossed(&self, tick: &Tick) -> Vec<Decimal> {
        self.targets
            .get(&tick.symbol)
            .map(|targets| targets.range(..tick.price).copied().collect())
            .unwrap_or_default()
    }

    /// Number of watched `(symbol, target)` pairs.
    pub fn len(&self) -> usize {
        self.targets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Evaluates ticks against the price targets learned from the event bus.
pub struct ThresholdWatcher {
    watch_set: WatchSet,
    bus: EventBus,
    ticks: RemoteQueue<Tick>,
}

impl ThresholdWatcher {
    /// Create a new ThresholdWatcher.
    ///
    /// # Arguments
    ///
    /// * `bus` - Event bus to learn targets from and publish crossings on
    /// * `ticks` - Queue the ingest worker pushes ticks to
    pub fn new(bus: EventBus, ticks: RemoteQueue<Tick>) -> Self {
        Self {
            watch_set: WatchSet::new(),
            bus,
            ticks,
        }
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    /// Run the ThresholdWatcher until shutdown or a broker failure.
    ///
    /// The blocking tick dequeue runs in its own task and hands ticks over a
    /// channel, so this task only ever waits on cancel safe futures and
    /// owns the `WatchSet` alone.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), ProcessorError> {
        let mut subscription = self.bus.subscribe().await?;
        info!(channel = %self.bus.channel(), queue = %self.ticks.name(), "ThresholdWatcher started");

        let (tick_tx, mut tick_rx) = tick_channel();
        let pump = tokio::spawn(pump_ticks(self.ticks.clone(), tick_tx, shutdown_rx.clone()));

        let result = self
            .listen(&mut subscription, &mut tick_rx, &mut shutdown_rx)
            .await;
        if let Err(e) = result {
            pump.abort();
            error!(error = %e, "ThresholdWatcher stopped");
            return Err(e);
        }

        // The pump has either seen the same shutdown or already failed.
        drop(tick_rx);
        pump.await??;
        info!("ThresholdWatcher shutdown complete");
        Ok(())
    }

    async fn listen(
        &mut self,
        subscription: &mut EventSubscription,
        tick_rx: &mut TickReceiver,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(shutdown_rx) => {
                    info!("ThresholdWatcher received shutdown signal");
                    return Ok(());
                }

                // Events first, so a fresh target is in place before the next tick.
                event = subscription.next() => {
                    if let Err(e) = dispatch(self, event?).await {
                        match e {}
                    }
                }

                tick = tick_rx.recv() => {
                    let Some(tick) = tick else {
                        info!("Tick pump stopped");
                        return Ok(());
                    };
                    self.process(tick).await?;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event projection
// ---------------------------------------------------------------------------

#[async_trait]
impl EventListener for ThresholdWatcher {
    const INTERESTS: &'static [EventKind] = &[EventKind::Watched, EventKind::PriceAboveTarget];

    type Error = Infallible;

    async fn on_event(&mut self, event: SystemEvent) -> Result<(), Infallible> {
        match event {
            SystemEvent::Watched {
                symbol,
                price_target,
            } => {
                debug!(%symbol, %price_target, "Watching target");
                self.watch_set.insert(symbol, price_target);
            }
            SystemEvent::PriceAboveTarget {
                symbol,
                price_target,
                ..
            } => {
                debug!(%symbol, %price_target, "Target reached, no longer watching");
                self.watch_set.remove(&symbol, &price_target);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<Tick> for ThresholdWatcher {
    /// Number of crossings published.
    type Output = usize;
    type Error = BrokerError;

    async fn process(&self, tick: Tick) -> Result<usize, BrokerError> {
        let crossed = self.watch_set.crossed(&tick);
        for price_target in &crossed {
            info!(
                symbol = %tick.symbol,
                %price_target,
                current_price = %tick.price,
                "Price above target"
            );
            self.bus
                .publish(&SystemEvent::PriceAboveTarget {
                    symbol: tick.symbol.clone(),
                    price_target: *price_target,
                    current_price: tick.price,
                })
                .await?;
        }
        Ok(crossed.len())
    }
}

/// Move ticks from the broker queue onto the in-process channel.
///
/// A tick is only popped once the channel has room for it. Undecodable
/// ticks are dropped. Ends on shutdown, when the receiver goes away, or with
/// the broker error that stopped it.
async fn pump_ticks(
    ticks: RemoteQueue<Tick>,
    tick_tx: TickSender,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    loop {
        let permit = tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown_rx) => return Ok(()),

            permit = tick_tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            },
        };

        let tick = tokio::select! {
            biased;

            _ = shutdown_requested(&mut shutdown_rx) => return Ok(()),

            tick = ticks.dequeue() => tick,
        };

        match tick {
            Ok(tick) => permit.send(tick),
            Err(BrokerError::Codec(e)) => {
                warn!(queue = %ticks.name(), error = %e, "Dropping malformed tick");
            }
            Err(e) => {
                error!(queue = %ticks.name(), error = %e, "Tick queue failed");
                return Err(e);
            }
        }
    }
}
