//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, status, audit) and shared utilities (open_db)
//! - `users` - User management and preferences
//! - `subscriptions` - Subscription management and the spending summary
//! - `notify` - Reminder and report runs
//! - `registry` - Registry rebuilds
//! - `codes` - One-time verification codes
//! - `serve` - Web server command

pub mod codes;
pub mod core;
pub mod notify;
pub mod registry;
pub mod serve;
pub mod subscriptions;
pub mod users;

// Re-export command functions for main.rs
pub use codes::*;
pub use core::*;
pub use notify::*;
pub use registry::*;
pub use serve::*;
pub use subscriptions::*;
pub use users::*;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use subtrack_core::db::Database;
use subtrack_core::models::User;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Find a user by numeric ID or email address
pub fn resolve_user(db: &Database, id_or_email: &str) -> Result<User> {
    let user = match id_or_email.trim().parse::<i64>() {
        Ok(id) => db.get_user(id)?,
        Err(_) => db.find_user_by_email(id_or_email)?,
    };
    user.ok_or_else(|| anyhow::anyhow!("User not found: {}", id_or_email))
}

/// Parse an optional `--date` value, defaulting to today (UTC)
pub fn parse_date_arg(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", s)),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Render a boolean preference
pub fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
