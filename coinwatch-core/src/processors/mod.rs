//! Event processors for the distributed pipeline.
//!
//! This module contains the three workers that make up the pipeline:
//!
//! - `IngestWorker`: Reads exchange frames, enqueues `Tick`; receives `Command`, emits `Watched`
//! - `ThresholdWatcher`: Receives `Tick` and `Watched`, emits `PriceAboveTarget`
//! - `NotificationRouter`: Receives client registrations and `PriceAboveTarget`, enqueues `Command`
//!
//! None of them share memory. Each owns its local state and talks to the
//! others through the broker only.

pub mod ingest;
pub mod notification_router;
pub mod threshold_watcher;


pub use ingest::IngestWorker;
pub use notification_router::{
    ClientRegistry, ConnectionHandle, ConnectionId, NotificationRouter, Registration,
    RouterError, RouterHandle,
};
pub use threshold_watcher::{ThresholdWatcher, WatchSet};

use crate::broker::BrokerError;
use crate::exchange::ExchangeError;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that end a processor loop.
///
/// Malformed messages never show up here; they are logged and dropped where
/// they are read.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The broker failed mid-loop.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The exchange connection went away.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// A helper task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] JoinError),
}
