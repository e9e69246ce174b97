//! Wire objects for CoinWatch.
//!
//! Everything that crosses a process boundary as text lives here: the
//! client WebSocket protocol, the exchange stream protocol and the
//! normalised [`Symbol`](objects::Symbol) shared by both.

#![forbid(unsafe_code)]

pub mod objects;
