//! Health check handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};
use subtrack_core::notify::EmailBackend;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub email_backend: &'static str,
}

/// GET /api/health - Liveness check (unauthenticated)
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    // Touch the pool so a broken database surfaces as a 500
    state.db.conn()?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        email_backend: state.email.name(),
    }))
}
