//! `POST /interact`: one utterance in, one reply out

use super::error::ApiError;
use super::state::AppState;
use crate::orchestrator::Interaction;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde_json::Value;
use tracing::debug;

// POST /interact
pub async fn interact(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Interaction>, ApiError> {
    if !is_json(&headers) {
        return Err(ApiError::bad_request("Content-Type must be application/json"));
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        debug!("Unparseable interact body: {}", e);
        ApiError::bad_request("Invalid or missing JSON data")
    })?;

    let interaction = state.orchestrator.interact_payload(&payload).await?;
    Ok(Json(interaction))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}
