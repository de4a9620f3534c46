//! HTTP dispatch layer for the pipeline.
//!
//! A thin JSON-over-HTTP binding of the orchestrator operations. This is the
//! only place pipeline errors are mapped to status codes and `{ok:false,
//! error}` envelopes; the presentation layer consumes these contracts.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::AppConfig;

/// Shared state for the dispatch layer.
///
/// Only the configuration is shared; every request opens its own store
/// connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
}

/// Start the HTTP server.
pub async fn serve(config: AppConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState {
        config: Arc::new(config),
    };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
