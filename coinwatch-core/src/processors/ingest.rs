//! IngestWorker processor.
//!
//! The IngestWorker is responsible for:
//! - Subscribing to the watch-list (plus the default symbols) on the exchange
//! - Turning exchange trade frames into `Tick`s on the tick queue
//! - Receiving `Command::Watch`, persisting the symbol, subscribing to it and
//!   publishing `Watched`
//!
//! The tick loop and the command loop share one exchange connection. When
//! the exchange stream ends the tick loop unsubscribes everything and stops;
//! the command loop is left running.

use super::ProcessorError;
use crate::broker::{BrokerError, EventBus, RemoteQueue, WatchListStore};
use crate::config::IngestSettings;
use crate::events::{Command, ExchangeFrameReceiver, SystemEvent, Tick};
use crate::exchange::ExchangeHandle;
use crate::utils::shutdown_requested;
use coinwatch_sdk::objects::{AggTrade, Symbol, parse_trade_frame};
use kanau::processor::Processor;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Bridges the exchange stream into the pipeline.
pub struct IngestWorker {
    ticks: RemoteQueue<Tick>,
    commands: RemoteQueue<Command>,
    bus: EventBus,
    watch_list: WatchListStore,
    exchange: ExchangeHandle,
    settings: IngestSettings,
}

impl IngestWorker {
    /// Create a new IngestWorker.
    ///
    /// # Arguments
    ///
    /// * `ticks` - Queue to push ticks to
    /// * `commands` - Queue to take commands from
    /// * `bus` - Event bus to publish `Watched` on
    /// * `watch_list` - Durable set of tracked symbols
    /// * `exchange` - Control side of the exchange connection
    /// * `settings` - Ingest settings
    pub fn new(
        ticks: RemoteQueue<Tick>,
        commands: RemoteQueue<Command>,
        bus: EventBus,
        watch_list: WatchListStore,
        exchange: ExchangeHandle,
        settings: IngestSettings,
    ) -> Self {
        Self {
            ticks,
            commands,
            bus,
            watch_list,
            exchange,
            settings,
        }
    }

    /// Run the IngestWorker over the inbound frames of one exchange connection.
    ///
    /// Returns once both loops are done, or as soon as either fails.
    pub async fn run(
        self,
        frames_rx: ExchangeFrameReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        let worker = Arc::new(self);
        let startup = worker.subscribe_watch_list().await?;
        info!(
            symbols = ?startup,
            tick_queue = %worker.ticks.name(),
            command_queue = %worker.commands.name(),
            "IngestWorker started"
        );

        let mut tick_task = tokio::spawn(worker.clone().tick_loop(
            frames_rx,
            startup,
            shutdown_rx.clone(),
        ));
        let mut command_task = tokio::spawn(worker.command_loop(shutdown_rx));

        let result = tokio::select! {
            result = &mut tick_task => match joined(result) {
                Ok(()) => joined(command_task.await),
                Err(e) => {
                    command_task.abort();
                    Err(e)
                }
            },
            result = &mut command_task => match joined(result) {
                Ok(()) => joined(tick_task.await),
                Err(e) => {
                    tick_task.abort();
                    Err(e)
                }
            },
        };

        match &result {
            Ok(()) => info!("IngestWorker shutdown complete"),
            Err(e) => error!(error = %e, "IngestWorker stopped"),
        }
        result
    }

    /// Merge the defaults into the watch-list and subscribe to all of it.
    async fn subscribe_watch_list(&self) -> Result<BTreeSet<Symbol>, ProcessorError> {
        self.watch_list.add_all(&self.settings.default_symbols).await?;
        let symbols = self.watch_list.members().await?;
        self.exchange.subscribe(&symbols).await?;
        Ok(symbols)
    }

    /// Forward trades until shutdown, stream end or failure, then
    /// unsubscribe from the watch-list whichever way it ended.
    async fn tick_loop(
        self: Arc<Self>,
        frames_rx: ExchangeFrameReceiver,
        startup: BTreeSet<Symbol>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        let result = self.forward_trades(frames_rx, shutdown_rx).await;
        self.unsubscribe_all(&startup).await;
        result
    }

    async fn forward_trades(
        &self,
        mut frames_rx: ExchangeFrameReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        loop {
            let frame = tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Tick loop received shutdown signal");
                    return Ok(());
                }

                frame = frames_rx.recv() => frame,
            };

            let Some(frame) = frame else {
                info!("Exchange stream ended");
                return Ok(());
            };

            match parse_trade_frame(&frame) {
                Ok(Some(trade)) => self.process(trade).await?,
                Ok(None) => debug!(%frame, "Ignoring non-trade frame"),
                Err(e) => warn!(%frame, error = %e, "Dropping malformed exchange frame"),
            }
        }
    }

    /// Unsubscribe from every tracked symbol, best effort.
    async fn unsubscribe_all(&self, startup: &BTreeSet<Symbol>) {
        let symbols = match self.watch_list.members().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Could not read watch-list, using startup snapshot");
                startup.clone()
            }
        };
        match self.exchange.unsubscribe(&symbols).await {
            Ok(()) => info!(count = symbols.len(), "Unsubscribed from watched symbols"),
            Err(e) => warn!(error = %e, "Could not unsubscribe from watched symbols"),
        }
    }

    async fn command_loop(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), ProcessorError> {
        loop {
            let command = tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Command loop received shutdown signal");
                    return Ok(());
                }

                command = self.commands.dequeue() => command,
            };

            match command {
                Ok(command) => self.process(command).await?,
                Err(BrokerError::Codec(e)) => {
                    warn!(queue = %self.commands.name(), error = %e, "Dropping malformed command");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn joined(result: Result<Result<(), ProcessorError>, JoinError>) -> Result<(), ProcessorError> {
    result?
}

// ---------------------------------------------------------------------------
// Processor trait implementations
// ---------------------------------------------------------------------------

impl Processor<AggTrade> for IngestWorker {
    type Output = ();
    type Error = BrokerError;

    async fn process(&self, trade: AggTrade) -> Result<(), BrokerError> {
        let tick = Tick {
            symbol: trade.symbol,
            price: trade.price,
        };
        self.ticks.enqueue(&tick).await
    }
}

impl Processor<Command> for IngestWorker {
    type Output = ();
    type Error = ProcessorError;

    /// Persist, subscribe, then announce. Listeners that see `Watched` can
    /// rely on the symbol already being in the watch-list.
    async fn process(&self, command: Command) -> Result<(), ProcessorError> {
        match command {
            Command::Watch {
                symbol,
                price_target,
            } => {
                info!(%symbol, %price_target, "Watch requested");
                self.watch_list.add(&symbol).await?;
                self.exchange.subscribe([&symbol]).await?;
                self.bus
                    .publish(&SystemEvent::Watched {
                        symbol,
                        price_target,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, EventSubscription, MemoryBroker, PayloadStream, SharedBroker};
    use crate::events::{
        ControlFrameReceiver, ControlFrameSender, ExchangeFrameSender, exchange_channels,
    };
    use async_trait::async_trait;
    use coinwatch_sdk::objects::{ControlFrame, ControlMethod};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Wraps a [`MemoryBroker`] and records the order of writes.
    ///
    /// With `control` set, control frames queued for the exchange since the
    /// last write are logged as `"subscribe"` ahead of the next write.
    struct RecordingBroker {
        inner: MemoryBroker,
        log: Mutex<Vec<&'static str>>,
        control: Option<ControlFrameSender>,
        fail_push: AtomicBool,
    }

    impl RecordingBroker {
        fn new(control: Option<ControlFrameSender>) -> Self {
            Self {
                inner: MemoryBroker::new(),
                log: Mutex::new(Vec::new()),
                control,
                fail_push: AtomicBool::new(false),
            }
        }

        async fn record(&self, op: &'static str) {
            let mut log = self.log.lock().await;
            if let Some(control) = &self.control {
                let queued = control.max_capacity() - control.capacity();
                let logged = log.iter().filter(|op| **op == "subscribe").count();
                for _ in logged..queued {
                    log.push("subscribe");
                }
            }
            log.push(op);
        }
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn ping(&self) -> Result<(), BrokerError> {
            self.inner.ping().await
        }

        async fn push(&self, queue: &str, payload: String) -> Result<(), BrokerError> {
            self.record("push").await;
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(BrokerError::Unavailable("push rejected".into()));
            }
            self.inner.push(queue, payload).await
        }

        async fn blocking_pop(&self, queue: &str) -> Result<String, BrokerError> {
            self.inner.blocking_pop(queue).await
        }

        async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
            self.record("publish").await;
            self.inner.publish(channel, payload).await
        }

        async fn subscribe(&self, channel: &str) -> Result<PayloadStream, BrokerError> {
            self.inner.subscribe(channel).await
        }

        async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BrokerError> {
            self.record("set_add").await;
            self.inner.set_add(key, members).await
        }

        async fn set_members(&self, key: &str) -> Result<Vec<String>, BrokerError> {
            self.inner.set_members(key).await
        }
    }

    struct Harness {
        worker: IngestWorker,
        frames_tx: ExchangeFrameSender,
        frames_rx: ExchangeFrameReceiver,
        control_rx: ControlFrameReceiver,
    }

    type ExchangeChannels = (
        ExchangeFrameSender,
        ExchangeFrameReceiver,
        ControlFrameSender,
        ControlFrameReceiver,
    );

    fn harness(broker: SharedBroker) -> Harness {
        harness_on(broker, exchange_channels())
    }

    fn harness_on(broker: SharedBroker, channels: ExchangeChannels) -> Harness {
        let (frames_tx, frames_rx, control_tx, control_rx) = channels;
        let worker = IngestWorker::new(
            RemoteQueue::new(broker.clone(), "price"),
            RemoteQueue::new(broker.clone(), "ingest_commands"),
            EventBus::new(broker.clone(), "events"),
            WatchListStore::new(broker, "watched_symbols"),
            ExchangeHandle::new(control_tx),
            IngestSettings::default(),
        );
        Harness {
            worker,
            frames_tx,
            frames_rx,
            control_rx,
        }
    }

    async fn next_event(subscription: &mut EventSubscription) -> SystemEvent {
        tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .unwrap()
            .unwrap()
    }

    async fn next_control(control_rx: &mut ControlFrameReceiver) -> ControlFrame {
        tokio::time::timeout(Duration::from_secs(5), control_rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_watch_persists_then_subscribes_then_publishes() {
        let channels = exchange_channels();
        let broker = Arc::new(RecordingBroker::new(Some(channels.2.clone())));
        let Harness {
            worker,
            mut control_rx,
            ..
        } = harness_on(broker.clone(), channels);

        worker
            .process(Command::watch(Symbol::new("ethusdc"), Decimal::from(2000)))
            .await
            .unwrap();

        assert_eq!(*broker.log.lock().await, vec!["set_add", "subscribe", "publish"]);
        let frame = control_rx.try_recv().unwrap();
        assert_eq!(frame, ControlFrame::subscribe([&Symbol::new("ethusdc")]));
        let members = broker.inner.set_members("watched_symbols").await.unwrap();
        assert_eq!(members, vec!["ethusdc".to_string()]);
    }

    #[tokio::test]
    async fn test_watch_announces_target() {
        let broker = Arc::new(MemoryBroker::new());
        let Harness {
            worker,
            control_rx: _control_rx,
            ..
        } = harness(broker.clone());
        let mut subscription = EventBus::new(broker.clone(), "events")
            .subscribe()
            .await
            .unwrap();

        worker
            .process(Command::watch(Symbol::new("btcusdc"), Decimal::from(90)))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut subscription).await,
            SystemEvent::Watched {
                symbol: Symbol::new("btcusdc"),
                price_target: Decimal::from(90),
            }
        );
    }

    #[tokio::test]
    async fn test_watch_fails_when_exchange_is_gone() {
        let broker = Arc::new(MemoryBroker::new());
        let Harness {
            worker, control_rx, ..
        } = harness(broker.clone());
        drop(control_rx);

        let result = worker
            .process(Command::watch(Symbol::new("btcusdc"), Decimal::from(90)))
            .await;
        assert!(matches!(result, Err(ProcessorError::Exchange(_))));
        // Persisted before the subscribe failed, never announced.
        assert_eq!(broker.set_members("watched_symbols").await.unwrap(), vec!["btcusdc"]);
    }

    #[tokio::test]
    async fn test_run_subscribes_and_forwards_trades() {
        let broker = Arc::new(MemoryBroker::new());
        broker
            .set_add("watched_symbols", &["dogeusdc".to_string()])
            .await
            .unwrap();
        let Harness {
            worker,
            frames_tx,
            frames_rx,
            mut control_rx,
        } = harness(broker.clone());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(frames_rx, shutdown_rx));

        let subscribe = next_control(&mut control_rx).await;
        assert_eq!(subscribe.method, ControlMethod::Subscribe);
        assert_eq!(
            subscribe.params,
            vec![
                "btcusdc@aggTrade",
                "dogeusdc@aggTrade",
                "ethusdc@aggTrade",
                "sandusdc@aggTrade"
            ]
        );

        frames_tx.send("not json".to_string()).await.unwrap();
        frames_tx.send(r#"{"result":null,"id":1}"#.to_string()).await.unwrap();
        frames_tx
            .send(r#"{"e":"aggTrade","s":"BTCUSDC","p":"100.5"}"#.to_string())
            .await
            .unwrap();

        let ticks: RemoteQueue<Tick> = RemoteQueue::new(broker.clone(), "price");
        let tick = tokio::time::timeout(Duration::from_secs(5), ticks.dequeue())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tick.symbol, Symbol::new("btcusdc"));
        assert_eq!(tick.price, Decimal::new(1005, 1));
        assert_eq!(broker.queue_len("price").await, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_stream_end_unsubscribes_but_commands_continue() {
        let broker = Arc::new(MemoryBroker::new());
        let Harness {
            worker,
            frames_tx,
            frames_rx,
            mut control_rx,
        } = harness(broker.clone());
        let mut subscription = EventBus::new(broker.clone(), "events")
            .subscribe()
            .await
            .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(frames_rx, shutdown_rx));

        assert_eq!(next_control(&mut control_rx).await.method, ControlMethod::Subscribe);

        drop(frames_tx);
        let unsubscribe = next_control(&mut control_rx).await;
        assert_eq!(unsubscribe.method, ControlMethod::Unsubscribe);
        assert_eq!(unsubscribe.params.len(), 3);

        let commands: RemoteQueue<Command> = RemoteQueue::new(broker.clone(), "ingest_commands");
        commands
            .enqueue(&Command::watch(Symbol::new("ethusdc"), Decimal::from(2000)))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut subscription).await,
            SystemEvent::Watched {
                symbol: Symbol::new("ethusdc"),
                price_target: Decimal::from(2000),
            }
        );
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tick_failure_still_unsubscribes() {
        let broker = Arc::new(RecordingBroker::new(None));
        let Harness {
            worker,
            frames_tx,
            frames_rx,
            mut control_rx,
        } = harness(broker.clone());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(frames_rx, shutdown_rx));

        assert_eq!(next_control(&mut control_rx).await.method, ControlMethod::Subscribe);

        broker.fail_push.store(true, Ordering::SeqCst);
        frames_tx
            .send(r#"{"e":"aggTrade","s":"BTCUSDC","p":"100.5"}"#.to_string())
            .await
            .unwrap();

        let unsubscribe = next_control(&mut control_rx).await;
        assert_eq!(unsubscribe.method, ControlMethod::Unsubscribe);
        assert_eq!(unsubscribe.params.len(), 3);

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ProcessorError::Broker(_))));
    }

    #[tokio::test]
    async fn test_malformed_command_is_dropped() {
        let broker = Arc::new(MemoryBroker::new());
        let Harness {
            worker,
            frames_rx,
            frames_tx: _frames_tx,
            control_rx: _control_rx,
        } = harness(broker.clone());
        let mut subscription = EventBus::new(broker.clone(), "events")
            .subscribe()
            .await
            .unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(frames_rx, shutdown_rx));

        broker
            .push("ingest_commands", r#"{"cmd":"sell"}"#.to_string())
            .await
            .unwrap();
        broker
            .push(
                "ingest_commands",
                r#"{"cmd":"watch","symbol":"sandusdc","price_target":"0.5"}"#.to_string(),
            )
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut subscription).await,
            SystemEvent::Watched {
                symbol: Symbol::new("sandusdc"),
                price_target: Decimal::new(5, 1),
            }
        );
        handle.abort();
    }
}
