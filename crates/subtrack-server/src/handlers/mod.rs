//! API route handlers

mod audit;
mod cron;
mod dashboard;
mod health;

pub use audit::*;
pub use cron::*;
pub use dashboard::*;
pub use health::*;

use chrono::{NaiveDate, Utc};

use crate::AppError;

/// Resolve an optional `YYYY-MM-DD` query value, defaulting to today (UTC)
pub(crate) fn resolve_date(date: Option<&str>) -> Result<NaiveDate, AppError> {
    match date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request("date must be YYYY-MM-DD")),
        None => Ok(Utc::now().date_naive()),
    }
}
