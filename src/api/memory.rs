//! Memory listing, clearing and backup endpoints

use super::error::ApiError;
use super::state::AppState;
use crate::memory::ExchangeRecord;
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

/// How many entries `GET /memory` returns
const LISTING_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct MemoryListing {
    pub total: usize,
    pub entries: Vec<ExchangeRecord>,
}

// GET /memory
pub async fn list_memory(State(state): State<AppState>) -> Json<MemoryListing> {
    let log = state.store().snapshot().await;
    Json(MemoryListing {
        total: log.len(),
        entries: log.recent(LISTING_LIMIT),
    })
}

// POST /memory/clear
pub async fn clear_memory(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .store()
        .clear()
        .await
        .map_err(|e| ApiError::internal("Failed to clear memory", &e.to_string()))?;
    Ok(Json(json!({ "status": "cleared" })))
}

// POST /memory/backup
pub async fn backup_memory(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let entries = state
        .store()
        .backup(state.backup.as_ref())
        .await
        .map_err(|e| ApiError::internal("Failed to back up memory", &e.to_string()))?;
    Ok(Json(json!({
        "status": "backed_up",
        "entries": entries,
        "target": state.backup.describe(),
    })))
}
