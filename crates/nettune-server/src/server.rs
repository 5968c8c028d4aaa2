//! Server entry: bind, serve, shut down gracefully.

use crate::router::build_router;
use crate::state::AppState;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Bind and serve until ctrl-c. An in-flight apply always runs to
/// completion; only the listener stops accepting.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let app = build_router(state.clone());
    let listener = TcpListener::bind(&state.config.listen).await?;

    info!(listen = %state.config.listen, "nettune server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
