use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use coinwatch_core::events::outbound_channel;
use coinwatch_core::processors::ConnectionHandle;
use coinwatch_core::utils::shutdown_requested;
use coinwatch_sdk::objects::{ClientRequest, Symbol, invalid_json_reply, parse_client_frame};
use rust_decimal::Decimal;

use crate::state::AppState;

/// `GET /ws`: client notification stream.
///
/// Clients send `{"cmd":"watch","symbol":..,"price":..}` frames and get a
/// text notification pushed once the symbol trades above the price. Every
/// valid JSON frame is echoed back; anything else gets an error text.
pub async fn client_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_ws(socket, state))
}

/// Background task that drives a single WebSocket connection.
///
/// Inbound frames and outbound notifications are multiplexed on the one
/// socket until the client leaves or the server shuts down.
async fn handle_client_ws(mut socket: WebSocket, state: AppState) {
    let (outbound_tx, mut outbound_rx) = outbound_channel();
    let connection = ConnectionHandle::new(outbound_tx);
    let mut shutdown_rx = state.shutdown_rx.clone();
    tracing::debug!(connection = %connection.id, "WS: client connected");

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown_rx) => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            // `connection` holds a sender, so this never yields `None`.
            Some(text) = outbound_rx.recv() => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_text(&mut socket, &state, &connection, text.as_str())
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection = %connection.id, error = %e, "WS: receive failed");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(connection = %connection.id, "WS: client disconnected");
}

/// What a connection does with one inbound text frame.
#[derive(Debug, PartialEq)]
struct FrameReply {
    /// Sent back to the client.
    text: String,
    /// Registered before `text` is sent.
    watch: Option<(Symbol, Decimal)>,
}

fn reply_to(raw: &str) -> FrameReply {
    match parse_client_frame(raw) {
        Ok(request) => FrameReply {
            text: raw.to_string(),
            watch: request.map(|ClientRequest::Watch { symbol, price }| (symbol, price)),
        },
        Err(_) => FrameReply {
            text: invalid_json_reply(raw),
            watch: None,
        },
    }
}

/// Handle one inbound text frame.
///
/// Returns `Err(())` if the connection should be dropped.
async fn handle_text(
    socket: &mut WebSocket,
    state: &AppState,
    connection: &ConnectionHandle,
    raw: &str,
) -> Result<(), ()> {
    let FrameReply { text, watch } = reply_to(raw);

    if let Some((symbol, price)) = watch {
        tracing::info!(connection = %connection.id, %symbol, %price, "WS: watch requested");
        if let Err(e) = state
            .router
            .register(symbol, price, connection.clone())
            .await
        {
            tracing::error!(error = %e, "WS: failed to register client");
            let _ = socket.send(Message::Close(None)).await;
            return Err(());
        }
    }

    send_text(socket, text).await
}

/// Send a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_text(socket: &mut WebSocket, text: String) -> Result<(), ()> {
    socket
        .send(Message::Text(text.into()))
        .await
        .map_err(|_| ())
}
