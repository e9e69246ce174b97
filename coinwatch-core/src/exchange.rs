//! The ingest worker's view of the exchange connection.
//!
//! The socket itself lives in the server crate. The worker only sees a
//! receiver of inbound text frames and an [`ExchangeHandle`] for control
//! frames, so it can run against a fake exchange in tests.

use crate::events::ControlFrameSender;
use coinwatch_sdk::objects::{ControlFrame, Symbol};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The socket task is gone; nothing can be sent any more.
    #[error("exchange connection is closed")]
    Disconnected,
}

/// Writes control frames to the exchange connection.
#[derive(Clone)]
pub struct ExchangeHandle {
    control_tx: ControlFrameSender,
}

impl ExchangeHandle {
    pub fn new(control_tx: ControlFrameSender) -> Self {
        Self { control_tx }
    }

    /// Subscribe to the trade streams of `symbols`.
    ///
    /// An empty set sends nothing.
    pub async fn subscribe<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> Result<(), ExchangeError> {
        self.send(ControlFrame::subscribe(symbols)).await
    }

    /// Unsubscribe from the trade streams of `symbols`.
    ///
    /// An empty set sends nothing.
    pub async fn unsubscribe<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> Result<(), ExchangeError> {
        self.send(ControlFrame::unsubscribe(symbols)).await
    }

    async fn send(&self, frame: ControlFrame) -> Result<(), ExchangeError> {
        if frame.params.is_empty() {
            return Ok(());
        }
        debug!(method = ?frame.method, streams = ?frame.params, "Sending exchange control frame");
        self.control_tx
            .send(frame)
            .await
            .map_err(|_| ExchangeError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::exchange_channels;
    use coinwatch_sdk::objects::ControlMethod;

    #[tokio::test]
    async fn test_subscribe_sends_stream_names() {
        let (_frames_tx, _frames_rx, control_tx, mut control_rx) = exchange_channels();
        let handle = ExchangeHandle::new(control_tx);

        handle
            .subscribe(&[Symbol::new("btcusdc"), Symbol::new("ethusdc")])
            .await
            .unwrap();

        let frame = control_rx.recv().await.unwrap();
        assert_eq!(frame.method, ControlMethod::Subscribe);
        assert_eq!(frame.params, vec!["btcusdc@aggTrade", "ethusdc@aggTrade"]);
    }

    #[tokio::test]
    async fn test_empty_set_sends_nothing() {
        let (_frames_tx, _frames_rx, control_tx, mut control_rx) = exchange_channels();
        let handle = ExchangeHandle::new(control_tx);

        let none: Vec<Symbol> = Vec::new();
        handle.unsubscribe(&none).await.unwrap();
        drop(handle);
        assert!(control_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (_frames_tx, _frames_rx, control_tx, control_rx) = exchange_channels();
        drop(control_rx);
        let handle = ExchangeHandle::new(control_tx);

        assert!(matches!(
            handle.subscribe(&[Symbol::new("btcusdc")]).await,
            Err(ExchangeError::Disconnected)
        ));
    }
}
