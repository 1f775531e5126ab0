//! HTTP surface
//!
//! Routes:
//! - `GET /`, `GET /health`: status and memory counters
//! - `POST /interact`: `{"input": "<text>"}` → generated reply
//! - `GET /memory`: total count and the 10 most recent exchanges
//! - `POST /memory/clear`: drop the persisted document
//! - `POST /memory/backup`: copy the log to the backup document

pub mod error;
pub mod health;
pub mod interact;
pub mod memory;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use crate::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Routes without middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/interact", post(interact::interact))
        .route("/memory", get(memory::list_memory))
        .route("/memory/clear", post(memory::clear_memory))
        .route("/memory/backup", post(memory::backup_memory))
        .with_state(state)
}

/// Routes plus request tracing and, optionally, permissive CORS
pub fn build_app(state: AppState, enable_cors: bool) -> Router {
    let mut app = router(state).layer(TraceLayer::new_for_http());
    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve(
    addr: &str,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    info!("Endpoints: /, /health, /interact, /memory, /memory/clear, /memory/backup");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("HTTP server shutting down");
        })
        .await?;
    Ok(())
}
