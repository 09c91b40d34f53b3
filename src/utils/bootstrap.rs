//! Bootstrap utilities for the worker binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the EVENTSYNC_LOG environment variable.
///
/// Defaults to "info" level if EVENTSYNC_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve once the process receives Ctrl+C.
///
/// A failure to install the handler is logged and treated as "never".
pub async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
