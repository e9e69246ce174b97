//! Message types for the client WebSocket.
//!
//! # Protocol
//!
//! 1. The client sends JSON text frames. A frame shaped like
//!    `{"cmd":"watch","symbol":"ethusdc","price":2000}` registers interest
//!    in `ethusdc` crossing above `2000`.
//! 2. Every frame that parses as JSON is echoed back verbatim, whether or
//!    not it was a recognised command.
//! 3. A frame that is not JSON is answered with
//!    [`invalid_json_reply`] and the connection stays open.
//! 4. When the price crosses the target, the server pushes a
//!    [`Notification`] rendered as plain text.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Client-to-server command.
///
/// Internally tagged on `"cmd"`:
///
/// ```json
/// {"cmd":"watch","symbol":"ethusdc","price":2000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Notify me once `symbol` trades above `price`.
    Watch { symbol: Symbol, price: Decimal },
}

/// Parse an inbound client frame.
///
/// Returns `Err` only when the frame is not JSON at all. Valid JSON that is
/// not a well-formed command yields `Ok(None)`: it is still echoed, it just
/// does not register anything.
pub fn parse_client_frame(raw: &str) -> Result<Option<ClientRequest>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(serde_json::from_value(value).ok())
}

/// Error text sent back for a frame that is not valid JSON.
pub fn invalid_json_reply(raw: &str) -> String {
    format!("Message was not valid json: {raw}")
}

/// Server-to-client notice that a watched price target was crossed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub symbol: Symbol,
    pub price_target: Decimal,
    pub current_price: Decimal,
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Take profit on {}: {} is above {}",
            self.symbol, self.current_price, self.price_target
        )
    }
}
