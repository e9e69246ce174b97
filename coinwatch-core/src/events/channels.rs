//! In-process channel factories and handles.
//!
//! The broker connects processes; these channels connect tasks inside one
//! process, so that each piece of local state has exactly one owning task.

use super::types::Tick;
use crate::processors::notification_router::Registration;
use coinwatch_sdk::objects::ControlFrame;
use tokio::sync::mpsc;

/// Default buffer size for in-process channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Buffer of the tick hand-off between the queue pump and the watcher.
///
/// Ticks left on the broker stay visible to other consumers, so the pump
/// holds on to at most one.
pub const TICK_HANDOFF_BUFFER: usize = 1;

/// Sender handle for ticks pumped off the tick queue.
pub type TickSender = mpsc::Sender<Tick>;
/// Receiver handle for ticks pumped off the tick queue.
pub type TickReceiver = mpsc::Receiver<Tick>;

/// Sender handle for client registrations bound for the router task.
pub type RegistrationSender = mpsc::Sender<Registration>;
/// Receiver handle for client registrations.
pub type RegistrationReceiver = mpsc::Receiver<Registration>;

/// Sender handle for text frames going out to one client connection.
pub type OutboundSender = mpsc::Sender<String>;
/// Receiver handle for text frames going out to one client connection.
pub type OutboundReceiver = mpsc::Receiver<String>;

/// Sender handle for raw text frames read from the exchange socket.
pub type ExchangeFrameSender = mpsc::Sender<String>;
/// Receiver handle for raw text frames read from the exchange socket.
pub type ExchangeFrameReceiver = mpsc::Receiver<String>;

/// Sender handle for control frames written to the exchange socket.
pub type ControlFrameSender = mpsc::Sender<ControlFrame>;
/// Receiver handle for control frames written to the exchange socket.
pub type ControlFrameReceiver = mpsc::Receiver<ControlFrame>;

/// Create a new Tick channel.
pub fn tick_channel() -> (TickSender, TickReceiver) {
    mpsc::channel(TICK_HANDOFF_BUFFER)
}

/// Create a new Registration channel.
///
/// Multiple senders can be cloned from the returned sender, one per client
/// connection handler.
pub fn registration_channel() -> (RegistrationSender, RegistrationReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the outbound channel of a single client connection.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the pair of channels that stands in for one exchange connection.
///
/// Returns `(frames_tx, frames_rx, control_tx, control_rx)`: the socket side
/// keeps `frames_tx` and `control_rx`, the ingest side keeps the other two.
pub fn exchange_channels() -> (
    ExchangeFrameSender,
    ExchangeFrameReceiver,
    ControlFrameSender,
    ControlFrameReceiver,
) {
    let (frames_tx, frames_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (control_tx, control_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    (frames_tx, frames_rx, control_tx, control_rx)
}
