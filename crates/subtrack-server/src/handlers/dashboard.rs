//! Per-user dashboard and registry handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve_date;
use crate::{get_actor, AppError, AppState};
use subtrack_core::models::UserRegistry;
use subtrack_core::report::Aggregate;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    /// Evaluate as of this day instead of today
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub user_id: i64,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

/// GET /api/users/:id/dashboard - Spending summary for one user
///
/// Read-only: lapsed next-payment dates are resolved for display but not
/// written back.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(query): Query<DashboardQuery>,
    request: Request,
) -> Result<Json<DashboardResponse>, AppError> {
    let actor = get_actor(request.headers());
    let today = resolve_date(query.date.as_deref())?;

    if state.db.get_user(user_id)?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let subscriptions = state.db.list_subscriptions(user_id)?;
    let aggregate = state
        .settings
        .dashboard_aggregator()
        .aggregate(&subscriptions, today)
        .rounded();

    state.db.log_audit(
        &actor,
        "view",
        Some("dashboard"),
        Some(user_id),
        Some(&format!("date={}", today)),
    )?;

    Ok(Json(DashboardResponse {
        user_id,
        date: today,
        aggregate,
    }))
}

/// GET /api/users/:id/registry - Denormalized subscription registry
pub async fn get_registry(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    request: Request,
) -> Result<Json<UserRegistry>, AppError> {
    let actor = get_actor(request.headers());

    if state.db.get_user(user_id)?.is_none() {
        return Err(AppError::not_found("User not found"));
    }

    let registry = state.db.get_or_rebuild_registry(user_id)?;

    state
        .db
        .log_audit(&actor, "view", Some("registry"), Some(user_id), None)?;

    Ok(Json(registry))
}
