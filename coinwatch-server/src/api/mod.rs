//! HTTP / WebSocket handlers.

pub mod ws;
