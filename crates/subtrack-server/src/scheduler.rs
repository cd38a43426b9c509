//! Background scheduler for notification runs
//!
//! Optional in-process alternative to an external cron hitting the trigger
//! endpoints, enabled via environment variable:
//!
//! - `SUBTRACK_NOTIFY_SCHEDULE`: Interval in hours (e.g., "24" for daily)
//!
//! Each run sends due payment reminders, sends last month's reports, and
//! purges expired one-time codes. Reminder and report watermarks make
//! repeated runs within the same day or month send nothing new.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{error, info, warn};

use subtrack_core::notify::{DispatchSummary, NotificationDispatcher};
use subtrack_core::{Database, Settings};

/// Environment variable holding the run interval in hours
pub const NOTIFY_SCHEDULE_ENV: &str = "SUBTRACK_NOTIFY_SCHEDULE";

/// Configuration for scheduled notification runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyScheduleConfig {
    /// Interval between runs in hours
    pub interval_hours: u64,
}

impl NotifyScheduleConfig {
    /// Parse configuration from environment variables
    ///
    /// Returns None if scheduling is not configured (SUBTRACK_NOTIFY_SCHEDULE not set)
    pub fn from_env() -> Option<Self> {
        Self::from_value(std::env::var(NOTIFY_SCHEDULE_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Option<Self> {
        let raw = value?;
        let interval_hours: u64 = match raw.trim().parse() {
            Ok(hours) => hours,
            Err(_) => {
                warn!("{} is not a number of hours: {:?}", NOTIFY_SCHEDULE_ENV, raw);
                return None;
            }
        };

        if interval_hours == 0 {
            warn!("{} is 0, scheduled notifications disabled", NOTIFY_SCHEDULE_ENV);
            return None;
        }

        Some(Self { interval_hours })
    }
}

/// What one scheduled run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyRun {
    pub reminders: Option<DispatchSummary>,
    pub reports: Option<DispatchSummary>,
    pub codes_purged: usize,
}

/// Start the notification scheduler as a background task
///
/// The first run happens immediately, then every `interval_hours`.
pub fn start_notify_scheduler(
    db: Database,
    dispatcher: NotificationDispatcher,
    settings: Settings,
    config: NotifyScheduleConfig,
) {
    info!(
        "Starting notification scheduler: every {} hours",
        config.interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_hours * 3600));

        loop {
            ticker.tick().await;
            info!("Running scheduled notifications...");
            run_scheduled_notifications(&db, &dispatcher, &settings, Utc::now()).await;
        }
    });
}

/// Run reminders, reports and code cleanup once
///
/// Failures are logged; a failing step does not stop the others.
pub async fn run_scheduled_notifications(
    db: &Database,
    dispatcher: &NotificationDispatcher,
    settings: &Settings,
    now: DateTime<Utc>,
) -> NotifyRun {
    let today = now.date_naive();
    let mut run = NotifyRun::default();

    if settings.reminders.enabled {
        match dispatcher.send_payment_reminders(today).await {
            Ok(summary) => run.reminders = Some(summary),
            Err(e) => error!("Scheduled payment reminders failed: {}", e),
        }
    }

    if settings.reports.enabled {
        match dispatcher.send_monthly_reports(today).await {
            Ok(summary) => run.reports = Some(summary),
            Err(e) => error!("Scheduled monthly reports failed: {}", e),
        }
    }

    match db.purge_expired_codes(now) {
        Ok(purged) => run.codes_purged = purged,
        Err(e) => warn!("Failed to purge expired codes: {}", e),
    }

    // Log to audit (as "scheduler" user)
    if let Err(e) = db.log_audit(
        "scheduler",
        "notify_scheduled",
        None,
        None,
        Some(&format!(
            "date={}, reminders_sent={}, reports_sent={}, codes_purged={}",
            today,
            run.reminders.map(|s| s.emails_sent).unwrap_or(0),
            run.reports.map(|s| s.emails_sent).unwrap_or(0),
            run.codes_purged
        )),
    ) {
        warn!("Failed to log scheduled run to audit: {}", e);
    }

    run
}
