//! The three process roles. Each runs one pipeline worker until shutdown.

use crate::config::runtime::RuntimeConfig;
use crate::exchange::ExchangeBridge;
use crate::server::{build_router, run_server};
use crate::state::AppState;
use coinwatch_core::broker::{EventBus, RemoteQueue, SharedBroker, WatchListStore};
use coinwatch_core::events::exchange_channels;
use coinwatch_core::exchange::ExchangeHandle;
use coinwatch_core::processors::{IngestWorker, NotificationRouter, ThresholdWatcher};
use std::time::Duration;
use tokio::sync::watch;

/// How long the exchange bridge gets to flush its last control frames.
const BRIDGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn event_bus(config: &RuntimeConfig, broker: &SharedBroker) -> EventBus {
    EventBus::new(broker.clone(), config.pipeline.event_channel.clone())
}

/// Client-facing WebSocket API plus its notification router.
pub async fn run_api(
    config: &RuntimeConfig,
    broker: SharedBroker,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let (router, router_handle) = NotificationRouter::new(
        event_bus(config, &broker),
        RemoteQueue::new(broker.clone(), config.pipeline.command_queue.clone()),
    );
    let mut router_task = tokio::spawn(router.run(shutdown_rx.clone()));

    let app = build_router(AppState::new(router_handle, shutdown_rx.clone()));
    let server = run_server(app, config.listen, shutdown_rx);
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result?;
            router_task.await??;
        }
        result = &mut router_task => {
            result??;
            server.await?;
        }
    }
    Ok(())
}

/// Exchange ingest.
pub async fn run_ingest(
    config: &RuntimeConfig,
    broker: SharedBroker,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let bridge = ExchangeBridge::connect(&config.exchange_url).await?;
    let (frames_tx, frames_rx, control_tx, control_rx) = exchange_channels();
    let bridge_task = tokio::spawn(bridge.run(frames_tx, control_rx));

    let worker = IngestWorker::new(
        RemoteQueue::new(broker.clone(), config.pipeline.tick_queue.clone()),
        RemoteQueue::new(broker.clone(), config.pipeline.command_queue.clone()),
        event_bus(config, &broker),
        WatchListStore::new(broker.clone(), config.pipeline.watch_list_key.clone()),
        ExchangeHandle::new(control_tx),
        config.ingest.clone(),
    );
    let result = worker.run(frames_rx, shutdown_rx).await;

    // The worker is gone, so is every handle; the bridge drains and closes.
    if tokio::time::timeout(BRIDGE_DRAIN_TIMEOUT, bridge_task)
        .await
        .is_err()
    {
        tracing::warn!("Exchange bridge did not close in time");
    }
    result.map_err(Into::into)
}

/// Threshold evaluation.
pub async fn run_watch(
    config: &RuntimeConfig,
    broker: SharedBroker,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let watcher = ThresholdWatcher::new(
        event_bus(config, &broker),
        RemoteQueue::new(broker, config.pipeline.tick_queue.clone()),
    );
    watcher.run(shutdown_rx).await.map_err(Into::into)
}
