//! User command implementations

use anyhow::{Context, Result};
use subtrack_core::db::Database;
use subtrack_core::models::ReminderFrequency;

use super::{on_off, resolve_user, truncate};

pub fn cmd_users_add(db: &Database, email: &str, name: Option<&str>) -> Result<i64> {
    let id = db
        .create_user(email, name)
        .with_context(|| format!("Failed to add user {}", email))?;
    db.log_audit("cli", "create", Some("user"), Some(id), None)?;

    println!("✅ Added user {} (ID: {})", email.trim(), id);
    Ok(id)
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;

    if users.is_empty() {
        println!("No users yet. Run:");
        println!("  subtrack users add you@example.com");
        return Ok(());
    }

    println!();
    println!("👥 Users");
    println!("   ─────────────────────────────────────────────────────────────");

    for user in users {
        let n = &user.notifications;
        println!(
            "   {:>4} │ {:30} │ {:16} │ reminders {:3} ({}) │ reports {}",
            user.id,
            truncate(&user.email, 30),
            truncate(user.display_name.as_deref().unwrap_or("-"), 16),
            on_off(n.payment_reminders),
            n.reminder_frequency.as_str(),
            on_off(n.monthly_reports),
        );
    }

    Ok(())
}

pub fn cmd_users_show(db: &Database, user: &str) -> Result<()> {
    let user = resolve_user(db, user)?;
    let history = db.get_email_history(user.id)?;
    let n = &user.notifications;
    let s = &user.security;

    println!();
    println!("👤 {} (ID: {})", user.email, user.id);
    if let Some(name) = &user.display_name {
        println!("   Name: {}", name);
    }
    println!("   Created: {}", user.created_at.format("%Y-%m-%d"));
    println!();
    println!("   Notifications");
    println!("     Payment reminders: {}", on_off(n.payment_reminders));
    println!("     Reminder frequency: {}", n.reminder_frequency.as_str());
    println!("     Monthly reports: {}", on_off(n.monthly_reports));
    println!();
    println!("   Security");
    println!("     Two-factor: {}", on_off(s.two_factor_enabled));
    println!(
        "     Always require two-factor: {}",
        on_off(s.always_require_two_factor)
    );
    println!("     Login notifications: {}", on_off(s.login_notifications));

    if !history.is_empty() {
        println!();
        println!("   Email history");
        for change in history {
            println!(
                "     {} │ {} → {}",
                change.changed_at.format("%Y-%m-%d"),
                change.old_email,
                change.new_email
            );
        }
    }

    Ok(())
}

/// Preference changes from `users prefs`; `None` leaves a setting unchanged
#[derive(Debug, Default)]
pub struct PrefsUpdate<'a> {
    pub reminders: Option<bool>,
    pub frequency: Option<&'a str>,
    pub reports: Option<bool>,
    pub two_factor: Option<bool>,
    pub always_two_factor: Option<bool>,
    pub login_notifications: Option<bool>,
}

pub fn cmd_users_prefs(db: &Database, user: &str, update: &PrefsUpdate) -> Result<()> {
    let user = resolve_user(db, user)?;

    let mut notifications = user.notifications;
    if let Some(v) = update.reminders {
        notifications.payment_reminders = v;
    }
    if let Some(f) = update.frequency {
        notifications.reminder_frequency = f
            .parse::<ReminderFrequency>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = update.reports {
        notifications.monthly_reports = v;
    }

    let mut security = user.security;
    if let Some(v) = update.two_factor {
        security.two_factor_enabled = v;
    }
    if let Some(v) = update.always_two_factor {
        security.always_require_two_factor = v;
    }
    if let Some(v) = update.login_notifications {
        security.login_notifications = v;
    }

    if notifications != user.notifications {
        db.update_notification_preferences(user.id, &notifications)?;
    }
    if security != user.security {
        db.update_security_preferences(user.id, &security)?;
    }
    db.log_audit(
        "cli",
        "update_preferences",
        Some("user"),
        Some(user.id),
        Some(&format!("{:?}", update)),
    )?;

    println!("✅ Preferences updated for {}", user.email);
    Ok(())
}

pub fn cmd_users_email(db: &Database, user: &str, new_email: &str) -> Result<()> {
    let user = resolve_user(db, user)?;

    db.change_user_email(user.id, new_email)
        .with_context(|| format!("Failed to change email for user {}", user.id))?;
    db.log_audit(
        "cli",
        "change_email",
        Some("user"),
        Some(user.id),
        Some(&format!("{} -> {}", user.email, new_email.trim())),
    )?;

    println!("✅ Email changed: {} → {}", user.email, new_email.trim());
    Ok(())
}
