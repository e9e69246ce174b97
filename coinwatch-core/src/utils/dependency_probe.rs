//! Startup gate that holds a worker until the broker answers.

use crate::broker::Broker;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Ping `broker` every `interval` until it answers.
///
/// Never gives up on its own. Returns `true` once the broker is reachable,
/// or `false` if shutdown was requested first.
pub async fn wait_for_dependencies(
    broker: &dyn Broker,
    interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let mut attempt: u64 = 1;
    loop {
        if *shutdown_rx.borrow() {
            return false;
        }
        match broker.ping().await {
            Ok(()) => {
                info!(attempt, "Dependencies available");
                return true;
            }
            Err(e) => {
                warn!(
                    attempt,
                    error = %e,
                    retry_in_secs = interval.as_secs_f64(),
                    "Dependencies unavailable, retrying"
                );
            }
        }

        tokio::select! {
            biased;

            _ = super::shutdown_requested(shutdown_rx) => return false,

            _ = tokio::time::sleep(interval) => {}
        }
        attempt += 1;
    }
}
