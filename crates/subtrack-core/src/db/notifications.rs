//! Notification watermarks
//!
//! `reminder_log` holds one row per subscription per send date and
//! `report_log` one row per user per report period. A row's presence means
//! the email went out, so a repeated trigger skips it.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{parse_datetime, Database};
use crate::error::Result;

/// A sent monthly report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRecord {
    pub user_id: i64,
    /// "YYYY-MM"
    pub period: String,
    pub total_spent: f64,
    pub message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl Database {
    /// Whether a reminder for this subscription already went out on `sent_on`
    pub fn reminder_sent(&self, subscription_id: i64, sent_on: NaiveDate) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM reminder_log WHERE subscription_id = ? AND sent_on = ?)",
            params![subscription_id, sent_on.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Record a sent reminder; returns false if one was already recorded
    pub fn record_reminder(
        &self,
        subscription_id: i64,
        sent_on: NaiveDate,
        payment_date: NaiveDate,
        message_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO reminder_log (subscription_id, sent_on, payment_date, message_id)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                subscription_id,
                sent_on.to_string(),
                payment_date.to_string(),
                message_id
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Number of reminders recorded for a subscription
    pub fn count_reminders(&self, subscription_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM reminder_log WHERE subscription_id = ?",
            params![subscription_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Sent report for a user and period, if any
    pub fn get_report_record(&self, user_id: i64, period: &str) -> Result<Option<ReportRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                r#"
                SELECT user_id, period, total_spent, message_id, sent_at
                FROM report_log
                WHERE user_id = ? AND period = ?
                "#,
                params![user_id, period],
                |row| {
                    let sent_at: String = row.get(4)?;
                    Ok(ReportRecord {
                        user_id: row.get(0)?,
                        period: row.get(1)?,
                        total_spent: row.get(2)?,
                        message_id: row.get(3)?,
                        sent_at: parse_datetime(&sent_at),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Record a sent report; returns false if one was already recorded
    pub fn record_report(
        &self,
        user_id: i64,
        period: &str,
        total_spent: f64,
        message_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO report_log (user_id, period, total_spent, message_id)
            VALUES (?, ?, ?, ?)
            "#,
            params![user_id, period, total_spent, message_id],
        )?;
        Ok(inserted > 0)
    }
}
