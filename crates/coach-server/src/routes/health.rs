//! Health check endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use coach_core::HealthSnapshot;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check.
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Queue depth, stuck drafts, cycle counters and last task runs.
/// GET /system/health
pub async fn system_health(State(state): State<AppState>) -> ApiResult<Json<HealthSnapshot>> {
    let snapshot = state.engine().system_health()?;
    Ok(Json(snapshot))
}
