//! Event system for the distributed pipeline.
//!
//! This module provides the message types carried by the broker and the
//! in-process channels used between tasks of one worker.
//!
//! # Event Flow
//!
//! 1. `IngestWorker` enqueues `Tick` -> `ThresholdWatcher`
//! 2. `ThresholdWatcher` publishes `PriceAboveTarget` -> `NotificationRouter`
//! 3. `NotificationRouter` enqueues `Command::Watch` -> `IngestWorker`
//! 4. `IngestWorker` publishes `Watched` -> `ThresholdWatcher`
//!
//! Nothing is acknowledged or replayed. Ticks and commands are consumed at
//! most once; events reach only the listeners subscribed at publish time.

pub mod channels;
pub mod types;

pub use channels::{
    ControlFrameReceiver, ControlFrameSender, DEFAULT_CHANNEL_BUFFER, ExchangeFrameReceiver,
    ExchangeFrameSender, OutboundReceiver, OutboundSender, RegistrationReceiver,
    RegistrationSender, TICK_HANDOFF_BUFFER, TickReceiver, TickSender, exchange_channels, outbound_channel,
    registration_channel, tick_channel,
};

pub use types::{Command, EventKind, SystemEvent, Tick};
