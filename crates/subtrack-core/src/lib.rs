//! Subtrack Core Library
//!
//! Shared functionality for the Subtrack subscription tracker:
//! - Billing-cycle normalization (monthly and annual equivalents)
//! - Recurrence advancement of next-payment dates
//! - Report aggregation (categories, top subscriptions, upcoming renewals)
//! - Notification dispatch (payment reminders, monthly reports) over a
//!   pluggable email backend
//! - Database access, migrations, and the derived user registry
//! - Settings loading

pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod recurrence;
pub mod report;

/// Test utilities including mock email API server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use billing::{BillingNormalizer, CustomCyclePolicy};
pub use config::Settings;
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use models::{BillingCycle, ReminderFrequency};
pub use notify::{
    DispatchSummary, EmailBackend, EmailClient, EmailMessage, NotificationDispatcher,
};
pub use recurrence::{days_until, next_occurrence, resolve_next_payment, CycleStep};
pub use report::{Aggregate, AggregatorOptions, ReportAggregator};
