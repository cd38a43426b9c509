//! Cron trigger handlers
//!
//! Both triggers accept GET (for schedulers that can only issue GETs) and
//! POST. `?date=YYYY-MM-DD` replays a run for another day.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::resolve_date;
use crate::{AppError, AppState};
use subtrack_core::notify::DispatchSummary;

#[derive(Debug, Deserialize)]
pub struct CronQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub success: bool,
    pub summary: DispatchSummary,
}

/// GET|POST /api/cron/payment-reminders - Send reminders due today
pub async fn trigger_payment_reminders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CronQuery>,
) -> Result<Json<CronResponse>, AppError> {
    let today = resolve_date(query.date.as_deref())?;

    if !state.settings.reminders.enabled {
        info!("Payment reminders disabled in settings");
        return Ok(Json(CronResponse {
            success: true,
            summary: DispatchSummary::default(),
        }));
    }

    let summary = state.dispatcher().send_payment_reminders(today).await?;

    state.db.log_audit(
        "cron",
        "payment_reminders",
        None,
        None,
        Some(&format!(
            "date={}, total={}, sent={}, errors={}",
            today, summary.total, summary.emails_sent, summary.errors
        )),
    )?;

    Ok(Json(CronResponse {
        success: true,
        summary,
    }))
}

/// GET|POST /api/cron/monthly-reports - Send last month's reports
pub async fn trigger_monthly_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CronQuery>,
) -> Result<Json<CronResponse>, AppError> {
    let today = resolve_date(query.date.as_deref())?;

    if !state.settings.reports.enabled {
        info!("Monthly reports disabled in settings");
        return Ok(Json(CronResponse {
            success: true,
            summary: DispatchSummary::default(),
        }));
    }

    let summary = state.dispatcher().send_monthly_reports(today).await?;

    state.db.log_audit(
        "cron",
        "monthly_reports",
        None,
        None,
        Some(&format!(
            "date={}, total={}, sent={}, errors={}",
            today, summary.total, summary.emails_sent, summary.errors
        )),
    )?;

    Ok(Json(CronResponse {
        success: true,
        summary,
    }))
}
