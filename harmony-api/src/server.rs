//! HTTP server lifecycle

use crate::api::build_router;
use crate::state::AppState;
use anyhow::Result;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Bind the configured address and serve until Ctrl-C, then give in-flight
/// requests `server.shutdown_timeout` to finish
pub async fn serve(state: AppState) -> Result<()> {
    let server_config = state.harmony.config.server.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(server_config.bind_address).await?;
    info!(address = %listener.local_addr()?, "Harmony API listening");

    let stop = Arc::new(Notify::new());
    let drain = stop.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        drain.notified().await;
    });
    let server = server.into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return Ok(result?),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received, draining connections");
        }
    }

    stop.notify_one();
    match tokio::time::timeout(server_config.shutdown_timeout, server).await {
        Ok(result) => result?,
        Err(_) => warn!(
            timeout_ms = server_config.shutdown_timeout.as_millis() as u64,
            "Connections still open after shutdown timeout, exiting"
        ),
    }
    info!("Harmony API stopped");
    Ok(())
}
