pub mod dependency_probe;

pub use dependency_probe::wait_for_dependencies;

use tokio::sync::watch;

/// Resolve once shutdown has been requested or the signal sender is gone.
///
/// Cancel safe, so it can sit in a `select!` next to any other branch.
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|stop| *stop).await.is_err() {
        tracing::debug!("Shutdown sender dropped");
    }
}
