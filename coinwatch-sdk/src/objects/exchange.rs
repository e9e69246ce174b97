//! Exchange stream protocol.
//!
//! Control frames go out as
//! `{"method":"SUBSCRIBE","params":["btcusdc@aggTrade"],"id":1}`;
//! trade events come in as `{"e":"aggTrade","s":"BTCUSDC","p":"100.5",...}`.
//! Anything else on the stream (subscription acks, other event types) is
//! not a trade.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Event type of aggregated trade frames.
pub const AGG_TRADE_EVENT: &str = "aggTrade";

/// Request id used for every subscribe frame.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Request id used for every unsubscribe frame.
pub const UNSUBSCRIBE_REQUEST_ID: u64 = 312;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMethod {
    Subscribe,
    Unsubscribe,
}

/// Outbound control frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    pub method: ControlMethod,
    /// Stream names, see [`Symbol::stream_name`].
    pub params: Vec<String>,
    pub id: u64,
}

impl ControlFrame {
    pub fn subscribe<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        Self {
            method: ControlMethod::Subscribe,
            params: symbols.into_iter().map(Symbol::stream_name).collect(),
            id: SUBSCRIBE_REQUEST_ID,
        }
    }

    pub fn unsubscribe<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        Self {
            method: ControlMethod::Unsubscribe,
            params: symbols.into_iter().map(Symbol::stream_name).collect(),
            id: UNSUBSCRIBE_REQUEST_ID,
        }
    }
}

/// The fields of an aggregated trade frame that the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "s")]
    pub symbol: Symbol,
    #[serde(rename = "p")]
    pub price: Decimal,
}

/// Parse an inbound exchange frame.
///
/// - `Err` if the frame is not JSON, or claims to be a trade but lacks a
///   usable symbol or price.
/// - `Ok(None)` for well-formed frames that are not trades.
pub fn parse_trade_frame(raw: &str) -> Result<Option<AggTrade>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.get("e").and_then(serde_json::Value::as_str) != Some(AGG_TRADE_EVENT) {
        return Ok(None);
    }
    serde_json::from_value(value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_subscribe_frame_shape() {
        let symbols = [Symbol::new("btcusdc"), Symbol::new("ethusdc")];
        let frame = ControlFrame::subscribe(&symbols);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": ["btcusdc@aggTrade", "ethusdc@aggTrade"],
                "id": 1
            })
        );
    }

    #[test]
    fn test_unsubscribe_frame_shape() {
        let frame = ControlFrame::unsubscribe([&Symbol::new("sandusdc")]);
        assert_eq!(frame.method, ControlMethod::Unsubscribe);
        assert_eq!(frame.params, vec!["sandusdc@aggTrade".to_string()]);
        assert_eq!(frame.id, UNSUBSCRIBE_REQUEST_ID);
    }

    #[test]
    fn test_parse_agg_trade() {
        let raw = r#"{"e":"aggTrade","E":1672515782136,"s":"BTCUSDC","a":12345,"p":"16800.51","q":"0.1","T":1672515782136,"m":true}"#;
        let trade = parse_trade_frame(raw).unwrap().unwrap();
        assert_eq!(trade.symbol, Symbol::new("btcusdc"));
        assert_eq!(trade.price, Decimal::from_str("16800.51").unwrap());
    }

    #[test]
    fn test_parse_non_trade_frames() {
        assert_eq!(parse_trade_frame(r#"{"result":null,"id":1}"#).unwrap(), None);
        assert_eq!(parse_trade_frame(r#"{"e":"trade","s":"BTCUSDC"}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_trade() {
        assert!(parse_trade_frame("{not json").is_err());
        assert!(parse_trade_frame(r#"{"e":"aggTrade","s":"BTCUSDC"}"#).is_err());
        assert!(parse_trade_frame(r#"{"e":"aggTrade","s":"BTCUSDC","p":"abc"}"#).is_err());
    }
}
