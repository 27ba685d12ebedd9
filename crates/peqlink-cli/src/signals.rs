//! Shutdown signals for long-running commands.

use std::future::Future;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, warn};

/// A future that completes on the first SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if the SIGTERM handler cannot be installed.
pub fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            _ = terminate.recv() => debug!("SIGTERM received, stopping"),
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => debug!("SIGINT received, stopping"),
                Err(e) => {
                    warn!(error = %e, "Ctrl-C handler unavailable, waiting for SIGTERM");
                    terminate.recv().await;
                }
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_pending_without_signal() {
        let shutdown = shutdown_signal().expect("Failed to install signal handlers");
        let result = tokio::time::timeout(Duration::from_millis(20), shutdown).await;
        assert!(result.is_err());
    }
}
