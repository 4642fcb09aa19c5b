use std::time::Duration;

/// Maximum time to wait for attribution runs and escalation ticks to drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    CtrlC,
    Terminate,
}

/// Resolves once the process is asked to stop.
///
/// # Panics
///
/// Panics if the Ctrl+C or SIGTERM signal handler cannot be installed.
pub async fn wait_for_shutdown() -> ShutdownReason {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => ShutdownReason::CtrlC,
        () = terminate => ShutdownReason::Terminate,
    }
}

/// Graceful shutdown future for `axum::serve`.
pub async fn shutdown_signal() {
    let reason = wait_for_shutdown().await;
    tracing::info!(?reason, "Shutdown requested, draining guard service");
}
