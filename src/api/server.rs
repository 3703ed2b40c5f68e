//! HTTP server lifecycle: bind, serve the portal router, stop on a
//! shutdown signal.
//!
//! Same shape as a background service: bind → spawn → return a handle
//! with a shutdown channel. `serve` is the blocking variant used by the
//! binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for a running server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub addr: SocketAddr,
    pub started_at: DateTime<Utc>,
}

/// Handle to a server running in a background task.
pub struct ServerHandle {
    pub info: ServerInfo,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServerHandle {
    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Bind `addr` and spawn the server. Port 0 picks an ephemeral port.
pub async fn start_server(
    core: Arc<CoreState>,
    addr: SocketAddr,
    settings_ttl: Duration,
) -> Result<ServerHandle, ServerError> {
    let listener = bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = api_router(core, settings_ttl);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }
        tracing::info!("API server stopped");
    });

    Ok(ServerHandle {
        info: ServerInfo {
            addr,
            started_at: Utc::now(),
        },
        shutdown_tx: Some(shutdown_tx),
    })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    core: Arc<CoreState>,
    addr: SocketAddr,
    settings_ttl: Duration,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, api_router(core, settings_ttl))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}
