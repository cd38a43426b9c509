//! Reminder and report run commands
//!
//! The same runs the cron endpoints trigger, for manual use and for hosts
//! that prefer a system crontab over HTTP.

use anyhow::{Context, Result};
use subtrack_core::db::Database;
use subtrack_core::notify::{DispatchSummary, EmailBackend, EmailClient, NotificationDispatcher};
use subtrack_core::Settings;

use super::parse_date_arg;

/// Email backend from the environment (EMAIL_BACKEND, EMAIL_API_URL, ...)
pub fn email_from_env(settings: &Settings) -> Result<EmailClient> {
    EmailClient::from_env(&settings.email).context("Failed to configure email backend")
}

fn print_summary(label: &str, summary: &DispatchSummary) {
    println!();
    println!("📬 {}", label);
    println!("   ─────────────────────────────");
    println!("   Users: {}", summary.total);
    println!("   Emails sent: {}", summary.emails_sent);
    println!("   Skipped: {}", summary.skipped);
    if summary.errors > 0 {
        println!("   ⚠️  Errors: {} (see log)", summary.errors);
    } else {
        println!("   Errors: 0");
    }
}

pub async fn cmd_remind(
    db: &Database,
    email: EmailClient,
    settings: &Settings,
    date: Option<&str>,
) -> Result<DispatchSummary> {
    let today = parse_date_arg(date)?;
    println!(
        "🔔 Sending payment reminders for {} via {} backend...",
        today,
        email.name()
    );

    let dispatcher = NotificationDispatcher::new(db.clone(), email, settings.clone());
    let summary = dispatcher.send_payment_reminders(today).await?;

    db.log_audit(
        "cli",
        "payment_reminders",
        None,
        None,
        Some(&format!(
            "date={}, sent={}, errors={}",
            today, summary.emails_sent, summary.errors
        )),
    )?;
    print_summary("Payment reminders", &summary);
    Ok(summary)
}

pub async fn cmd_report(
    db: &Database,
    email: EmailClient,
    settings: &Settings,
    date: Option<&str>,
) -> Result<DispatchSummary> {
    let today = parse_date_arg(date)?;
    println!(
        "📊 Sending monthly reports (run date {}) via {} backend...",
        today,
        email.name()
    );

    let dispatcher = NotificationDispatcher::new(db.clone(), email, settings.clone());
    let summary = dispatcher.send_monthly_reports(today).await?;

    db.log_audit(
        "cli",
        "monthly_reports",
        None,
        None,
        Some(&format!(
            "date={}, sent={}, errors={}",
            today, summary.emails_sent, summary.errors
        )),
    )?;
    print_summary("Monthly reports", &summary);
    Ok(summary)
}
