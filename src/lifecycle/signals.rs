//! OS signal handling.
//!
//! SIGINT and SIGTERM both trigger a graceful stop.

use tokio::signal::unix::{signal, SignalKind};

use super::Shutdown;

/// Wait for SIGINT or SIGTERM, then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: Shutdown) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    tracing::info!("Shutdown signal received");
    shutdown.trigger();
    Ok(())
}
