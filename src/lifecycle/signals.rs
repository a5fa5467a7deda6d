//! OS signals: SIGINT/SIGTERM stop the relay, SIGHUP reloads the settings file.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::lifecycle::Shutdown;

/// Resolve on Ctrl+C or SIGTERM.
pub async fn terminate_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Trigger `shutdown` on SIGINT/SIGTERM and reload settings on SIGHUP.
pub fn spawn(store: Arc<ConfigStore>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = terminate_signal() => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
            _ = reload_on_hangup(store) => {}
            _ = shutdown.wait() => {}
        }
    })
}

#[cfg(unix)]
async fn reload_on_hangup(store: Arc<ConfigStore>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGHUP handler");
            return std::future::pending().await;
        }
    };
    while hangup.recv().await.is_some() {
        tracing::info!(path = ?store.path(), "SIGHUP received, reloading settings");
        store.reload_now();
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_store: Arc<ConfigStore>) {
    std::future::pending().await
}
