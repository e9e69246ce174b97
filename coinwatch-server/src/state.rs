//! Application state shared across all request handlers.

use coinwatch_core::processors::RouterHandle;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// Registrations go to the notification router through this.
    pub router: RouterHandle,
    /// Lets open WebSocket connections close on shutdown.
    pub shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(router: RouterHandle, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            router,
            shutdown_rx,
        }
    }
}
