//! Liveness and memory counters for `GET /` and `GET /health`

use super::state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub backend: String,
    pub memory_entries: usize,
    /// Whether a persisted document currently exists
    pub memory_file: bool,
    pub timestamp: DateTime<Utc>,
}

// GET / and GET /health
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let store = state.store();
    Json(Health {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.orchestrator.provider_name().to_string(),
        backend: store.describe(),
        memory_entries: store.len().await,
        memory_file: store.document_exists().await,
        timestamp: Utc::now(),
    })
}
