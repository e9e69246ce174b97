pub mod client;
pub mod exchange;
pub mod symbol;

pub use client::{ClientRequest, Notification, invalid_json_reply, parse_client_frame};
pub use exchange::{AggTrade, ControlFrame, ControlMethod, parse_trade_frame};
pub use symbol::Symbol;
