use lograven_database::DbConnection;
use lograven_webhooks::WebhookDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// Drain webhook workers and close the pool, giving up after `timeout`
pub async fn cleanup(dispatcher: WebhookDispatcher, db: Arc<DbConnection>, timeout: Duration) {
    info!("Starting resource cleanup...");

    let cleanup_future = async {
        dispatcher.shutdown().await;

        match Arc::try_unwrap(db) {
            Ok(db) => {
                if let Err(e) = db.close().await {
                    warn!("Error closing database connection: {}", e);
                } else {
                    debug!("Database connection closed successfully");
                }
            }
            Err(_) => debug!("Database still has other references, skipping close"),
        }
    };

    match tokio::time::timeout(timeout, cleanup_future).await {
        Ok(()) => info!("Graceful shutdown completed"),
        Err(_) => warn!(
            "Cleanup timeout exceeded ({:?}), forcing shutdown",
            timeout
        ),
    }
}
