//! WebSocket connection to the exchange trade stream.
//!
//! One connection per ingest process, opened once. There is no reconnect:
//! when the socket goes away the ingest worker sees its stream end.

use coinwatch_core::events::{ControlFrameReceiver, ExchangeFrameSender};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type ExchangeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the exchange socket and shuttles frames between it and the
/// ingest worker.
pub struct ExchangeBridge {
    ws: ExchangeSocket,
}

impl ExchangeBridge {
    pub async fn connect(url: &Url) -> Result<Self, tokio_tungstenite::tungstenite::Error> {
        tracing::info!(%url, "Connecting to exchange");
        let (ws, _response) = connect_async(url.as_str()).await?;
        tracing::info!(%url, "Connected to exchange");
        Ok(Self { ws })
    }

    /// Forward inbound text frames to `frames_tx` and write every control
    /// frame from `control_rx` to the socket.
    ///
    /// Ends when the exchange closes the socket or when every
    /// `ExchangeHandle` has been dropped. Control frames already queued are
    /// written before the socket is closed.
    pub async fn run(mut self, frames_tx: ExchangeFrameSender, mut control_rx: ControlFrameReceiver) {
        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if frames_tx.send(text).await.is_err() {
                                tracing::trace!("Ingest no longer reads exchange frames");
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Exchange closed the connection");
                            break;
                        }
                        // Pings are answered by tungstenite itself.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Exchange connection failed");
                            break;
                        }
                        None => {
                            tracing::info!("Exchange stream ended");
                            break;
                        }
                    }
                }

                control = control_rx.recv() => {
                    let Some(frame) = control else {
                        tracing::info!("No more exchange handles, closing connection");
                        if let Err(e) = self.ws.close(None).await {
                            tracing::debug!(error = %e, "Exchange close failed");
                        }
                        break;
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode control frame");
                            continue;
                        }
                    };
                    if let Err(e) = self.ws.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "Failed to send control frame");
                        break;
                    }
                }
            }
        }
    }
}
