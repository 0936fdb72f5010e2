//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use rollcall_core::config::GatewayConfig;
use rollcall_scheduler::CycleScheduler;
use tower_http::trace::TraceLayer;

use crate::commands::CommandHandler;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// Live roll calls; webhook answers are recorded here.
    pub scheduler: Arc<CycleScheduler>,
    pub commands: Arc<CommandHandler>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(scheduler: Arc<CycleScheduler>, commands: Arc<CommandHandler>) -> Self {
        Self {
            scheduler,
            commands,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(crate::routes::health_check))
        .route("/api/v1/status", get(crate::routes::status))
        .route("/webhook/whatsapp", post(crate::routes::bridge_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the HTTP server.
pub async fn start(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway listening on http://{} (webhook: /webhook/whatsapp)", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
