//! Payment reminder and monthly report fan-out
//!
//! Users are processed one at a time. A failure for one user (database or
//! email) is logged and counted, and the batch moves on to the next user.
//! Watermarks in `reminder_log` and `report_log` make a repeated trigger on
//! the same day (or for the same month) send nothing new.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::db::Database;
use crate::error::Result;
use crate::models::User;
use crate::report::{EvaluatedSubscription, ReminderPayload, ReportPayload, ReportPeriod};

use super::templates::{reminder_email, report_email, verification_code_email};
use super::{EmailBackend, EmailClient};

/// Outcome counts for one trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    /// Users considered
    pub total: usize,
    /// Emails accepted by the backend
    pub emails_sent: usize,
    /// Failed sends and failed users
    pub errors: usize,
    /// Users with nothing to send (opted out, nothing due, already sent)
    pub skipped: usize,
}

/// What happened for one user
enum UserOutcome {
    Sent(usize),
    Nothing,
}

pub struct NotificationDispatcher {
    db: Database,
    email: EmailClient,
    settings: Settings,
}

impl NotificationDispatcher {
    pub fn new(db: Database, email: EmailClient, settings: Settings) -> Self {
        Self {
            db,
            email,
            settings,
        }
    }

    /// Send payment reminders that are due on `today`
    pub async fn send_payment_reminders(&self, today: NaiveDate) -> Result<DispatchSummary> {
        let users = self.db.list_users()?;
        let mut summary = DispatchSummary {
            total: users.len(),
            ..Default::default()
        };

        for user in &users {
            if !user.notifications.payment_reminders {
                summary.skipped += 1;
                continue;
            }
            match self.remind_user(user, today, &mut summary).await {
                Ok(UserOutcome::Sent(n)) => {
                    debug!(user_id = user.id, sent = n, "Reminders sent");
                }
                Ok(UserOutcome::Nothing) => summary.skipped += 1,
                Err(e) => {
                    error!(user_id = user.id, error = %e, "Payment reminders failed for user");
                    summary.errors += 1;
                }
            }
        }

        info!(
            %today,
            total = summary.total,
            sent = summary.emails_sent,
            errors = summary.errors,
            skipped = summary.skipped,
            "Payment reminders complete"
        );
        Ok(summary)
    }

    async fn remind_user(
        &self,
        user: &User,
        today: NaiveDate,
        summary: &mut DispatchSummary,
    ) -> Result<UserOutcome> {
        let evaluated = self.load_and_advance(user, today)?;
        let frequency = user.notifications.reminder_frequency;
        let mut sent = 0;
        let mut failed = false;

        for entry in &evaluated {
            let payload = ReminderPayload::new(entry, today);
            if !frequency.is_due(payload.days_until_payment) {
                continue;
            }
            let sub_id = entry.subscription.id;
            if self.db.reminder_sent(sub_id, today)? {
                debug!(subscription_id = sub_id, "Reminder already sent today");
                continue;
            }

            let message = reminder_email(user, &payload, &self.settings.email.app_url);
            match self.email.send(&message).await {
                Ok(message_id) => {
                    self.db
                        .record_reminder(sub_id, today, entry.next_payment, Some(&message_id))?;
                    summary.emails_sent += 1;
                    sent += 1;
                }
                Err(e) => {
                    error!(
                        user_id = user.id,
                        subscription_id = sub_id,
                        backend = self.email.name(),
                        error = %e,
                        "Failed to send payment reminder"
                    );
                    summary.errors += 1;
                    failed = true;
                }
            }
        }

        Ok(if sent > 0 || failed {
            UserOutcome::Sent(sent)
        } else {
            UserOutcome::Nothing
        })
    }

    /// Send reports for the month preceding `today`
    pub async fn send_monthly_reports(&self, today: NaiveDate) -> Result<DispatchSummary> {
        let users = self.db.list_users()?;
        let period = ReportPeriod::preceding(today);
        let mut summary = DispatchSummary {
            total: users.len(),
            ..Default::default()
        };

        for user in &users {
            if !user.notifications.monthly_reports {
                summary.skipped += 1;
                continue;
            }
            match self.report_user(user, today, period).await {
                Ok(UserOutcome::Sent(n)) => summary.emails_sent += n,
                Ok(UserOutcome::Nothing) => summary.skipped += 1,
                Err(e) => {
                    error!(user_id = user.id, error = %e, "Monthly report failed for user");
                    summary.errors += 1;
                }
            }
        }

        info!(
            period = %period.key(),
            total = summary.total,
            sent = summary.emails_sent,
            errors = summary.errors,
            skipped = summary.skipped,
            "Monthly reports complete"
        );
        Ok(summary)
    }

    async fn report_user(
        &self,
        user: &User,
        today: NaiveDate,
        period: ReportPeriod,
    ) -> Result<UserOutcome> {
        let key = period.key();
        if self.db.get_report_record(user.id, &key)?.is_some() {
            debug!(user_id = user.id, period = %key, "Report already sent");
            return Ok(UserOutcome::Nothing);
        }

        let evaluated = self.load_and_advance(user, today)?;
        if evaluated.is_empty() {
            debug!(user_id = user.id, "No subscriptions to report");
            return Ok(UserOutcome::Nothing);
        }

        let aggregate = self
            .settings
            .report_aggregator()
            .aggregate_evaluated(&evaluated, today);
        let previous_month_spent = self
            .db
            .get_report_record(user.id, &period.previous().key())?
            .map(|r| r.total_spent)
            .unwrap_or(aggregate.total_monthly);

        let payload = ReportPayload::new(&aggregate, period, previous_month_spent);
        let message = report_email(user, &payload, &self.settings.email.app_url);
        let message_id = self.email.send(&message).await?;
        self.db
            .record_report(user.id, &key, aggregate.total_monthly, Some(&message_id))?;

        Ok(UserOutcome::Sent(1))
    }

    /// Issue a one-time code for `purpose` and email it to the user
    ///
    /// Returns the backend message id. If the send fails the code stays
    /// issued; a later call replaces it.
    pub async fn send_verification_code(
        &self,
        user_id: i64,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let user = self.db.require_user(user_id)?;
        let ttl_minutes = self.settings.codes.ttl_minutes;
        let code = self
            .db
            .issue_code(user.id, purpose, Duration::minutes(ttl_minutes), now)?;

        let message = verification_code_email(&user, &code, ttl_minutes, &self.settings.email.app_url);
        let message_id = self.email.send(&message).await?;
        info!(user_id, purpose, "Sent verification code");
        Ok(message_id)
    }

    /// Evaluate a user's subscriptions, persisting lapsed next-payment dates
    ///
    /// Malformed rows are skipped with a warning. The registry is rebuilt
    /// when anything was advanced.
    fn load_and_advance(&self, user: &User, today: NaiveDate) -> Result<Vec<EvaluatedSubscription>> {
        let subscriptions = self.db.list_subscriptions(user.id)?;
        let (evaluated, skipped) = self
            .settings
            .report_aggregator()
            .evaluate_all(&subscriptions, today);
        if skipped > 0 {
            warn!(user_id = user.id, skipped, "Skipped malformed subscriptions");
        }

        let mut advanced = 0;
        for entry in &evaluated {
            if entry.needs_advance(today) {
                self.db.set_next_payment(entry.subscription.id, entry.next_payment)?;
                advanced += 1;
            }
        }
        if advanced > 0 {
            self.db.rebuild_registry(user.id)?;
        }

        Ok(evaluated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingCycle, NewSubscription, NotificationPreferences, ReminderFrequency};
    use crate::notify::MockEmailBackend;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup() -> (Database, MockEmailBackend, NotificationDispatcher) {
        let db = Database::in_memory().unwrap();
        let mock = MockEmailBackend::new();
        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            EmailClient::Mock(mock.clone()),
            Settings::default(),
        );
        (db, mock, dispatcher)
    }

    fn add_sub(db: &Database, user_id: i64, name: &str, price: &str, next: NaiveDate) -> i64 {
        db.create_subscription(
            user_id,
            &NewSubscription {
                name: name.to_string(),
                price: price.to_string(),
                billing_cycle: BillingCycle::Monthly,
                start_date: d(2023, 1, 1),
                next_payment: Some(next),
                category: Some("Entertainment".to_string()),
            },
        )
        .unwrap()
    }

    fn set_frequency(db: &Database, user_id: i64, frequency: ReminderFrequency) {
        db.update_notification_preferences(
            user_id,
            &NotificationPreferences {
                reminder_frequency: frequency,
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_three_day_reminder() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", Some("Alex")).unwrap();
        add_sub(&db, user, "Netflix", "15.99", d(2024, 3, 4));
        add_sub(&db, user, "Spotify", "9.99", d(2024, 3, 3));
        add_sub(&db, user, "Hulu", "7.99", d(2024, 3, 5));

        let summary = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.emails_sent, 1);
        assert_eq!(summary.errors, 0);

        let sent = mock.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("Netflix"));
    }

    #[tokio::test]
    async fn test_daily_and_weekly_frequencies() {
        let (db, mock, dispatcher) = setup();
        let daily = db.create_user("daily@example.com", None).unwrap();
        let weekly = db.create_user("weekly@example.com", None).unwrap();
        set_frequency(&db, daily, ReminderFrequency::Daily);
        set_frequency(&db, weekly, ReminderFrequency::Weekly);

        for user in [daily, weekly] {
            add_sub(&db, user, "Due7", "5", d(2024, 3, 8));
            add_sub(&db, user, "Due1", "5", d(2024, 3, 2));
            add_sub(&db, user, "Due9", "5", d(2024, 3, 10));
        }

        dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        assert_eq!(mock.sent_to("daily@example.com").len(), 2);
        assert_eq!(mock.sent_to("weekly@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_second_trigger_same_day_sends_nothing() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        add_sub(&db, user, "Netflix", "15.99", d(2024, 3, 4));

        let first = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        let second = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();

        assert_eq!(first.emails_sent, 1);
        assert_eq!(second.emails_sent, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_opted_out_users_skipped() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        db.update_notification_preferences(
            user,
            &NotificationPreferences {
                payment_reminders: false,
                monthly_reports: false,
                ..Default::default()
            },
        )
        .unwrap();
        add_sub(&db, user, "Netflix", "15.99", d(2024, 3, 4));

        let reminders = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        let reports = dispatcher.send_monthly_reports(d(2024, 3, 1)).await.unwrap();
        assert_eq!(reminders.skipped, 1);
        assert_eq!(reports.skipped, 1);
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failure_for_one_user_does_not_stop_batch() {
        let (db, mock, dispatcher) = setup();
        let bad = db.create_user("bounce@example.com", None).unwrap();
        let good = db.create_user("good@example.com", None).unwrap();
        add_sub(&db, bad, "Netflix", "15.99", d(2024, 3, 4));
        add_sub(&db, good, "Netflix", "15.99", d(2024, 3, 4));
        mock.fail_for("bounce@example.com");

        let summary = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.emails_sent, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(mock.sent_to("good@example.com").len(), 1);

        // The failed reminder was not watermarked, so a retry sends it
        let sub = db.list_subscriptions(bad).unwrap()[0].id;
        assert!(!db.reminder_sent(sub, d(2024, 3, 1)).unwrap());
    }

    #[tokio::test]
    async fn test_lapsed_next_payment_is_advanced_and_persisted() {
        let (db, _mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        let id = add_sub(&db, user, "Netflix", "15.99", d(2024, 1, 15));

        dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();

        let sub = db.get_subscription(id).unwrap().unwrap();
        assert_eq!(sub.next_payment, "2024-03-15");
        let registry = db.get_registry(user).unwrap().unwrap();
        assert_eq!(registry.subscriptions[0].next_payment, d(2024, 3, 15));
    }

    #[tokio::test]
    async fn test_month_end_date_same_with_or_without_intermediate_run() {
        let (db, _mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        let with_run = add_sub(&db, user, "Gym", "30", d(2024, 1, 31));
        dispatcher.send_payment_reminders(d(2024, 2, 1)).await.unwrap();
        assert_eq!(db.get_subscription(with_run).unwrap().unwrap().next_payment, "2024-02-29");
        dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();

        let (other_db, _other_mock, other_dispatcher) = setup();
        let other_user = other_db.create_user("sam@example.com", None).unwrap();
        let without_run = add_sub(&other_db, other_user, "Gym", "30", d(2024, 1, 31));
        other_dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();

        let a = db.get_subscription(with_run).unwrap().unwrap().next_payment;
        let b = other_db.get_subscription(without_run).unwrap().unwrap().next_payment;
        assert_eq!(a, b);
        assert_eq!(a, "2024-03-29");
    }

    #[tokio::test]
    async fn test_malformed_subscription_skipped() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        db.import_subscription_raw(user, "Broken", "n/a", "Monthly", "2023-01-01", "2024-03-04", None)
            .unwrap();
        add_sub(&db, user, "Netflix", "15.99", d(2024, 3, 4));

        let summary = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary.emails_sent, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_monthly_report_once_per_period() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        add_sub(&db, user, "Netflix", "19.99", d(2024, 3, 20));
        add_sub(&db, user, "Spotify", "9.99", d(2024, 3, 5));

        let first = dispatcher.send_monthly_reports(d(2024, 3, 1)).await.unwrap();
        assert_eq!(first.emails_sent, 1);

        let sent = mock.sent();
        assert_eq!(sent[0].subject, "Your February 2024 subscription report");
        assert!(sent[0].text.contains("$29.98"));
        // No history yet, so the change is zero
        assert!(sent[0].text.contains("the same as last month"));

        let record = db.get_report_record(user, "2024-02").unwrap().unwrap();
        assert!((record.total_spent - 29.98).abs() < 1e-9);

        let second = dispatcher.send_monthly_reports(d(2024, 3, 15)).await.unwrap();
        assert_eq!(second.emails_sent, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_monthly_report_compares_previous_period() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", None).unwrap();
        db.record_report(user, "2024-01", 19.99, None).unwrap();
        add_sub(&db, user, "Netflix", "19.99", d(2024, 3, 20));
        add_sub(&db, user, "Spotify", "9.99", d(2024, 3, 5));

        dispatcher.send_monthly_reports(d(2024, 3, 1)).await.unwrap();
        assert!(mock.sent()[0].text.contains("up $9.99 from last month"));
    }

    #[tokio::test]
    async fn test_monthly_report_skips_users_without_subscriptions() {
        let (db, mock, dispatcher) = setup();
        db.create_user("empty@example.com", None).unwrap();

        let summary = dispatcher.send_monthly_reports(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_report_failure_counted_and_not_watermarked() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("bounce@example.com", None).unwrap();
        add_sub(&db, user, "Netflix", "19.99", d(2024, 3, 20));
        mock.fail_for("bounce@example.com");

        let summary = dispatcher.send_monthly_reports(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert!(db.get_report_record(user, "2024-02").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verification_code_round_trip() {
        let (db, mock, dispatcher) = setup();
        let user = db.create_user("alex@example.com", Some("Alex")).unwrap();
        let now = Utc::now();

        dispatcher
            .send_verification_code(user, "login", now)
            .await
            .unwrap();

        let sent = mock.sent_to("alex@example.com");
        assert_eq!(sent.len(), 1);
        let code: String = sent[0]
            .text
            .split("code is ")
            .nth(1)
            .unwrap()
            .chars()
            .take(6)
            .collect();

        let check = db.verify_code(user, "login", &code, 5, now).unwrap();
        assert_eq!(check, crate::db::CodeCheck::Valid);
    }

    #[tokio::test]
    async fn test_verification_code_unknown_user() {
        let (_db, mock, dispatcher) = setup();
        assert!(dispatcher
            .send_verification_code(99, "login", Utc::now())
            .await
            .is_err());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_users() {
        let (_db, _mock, dispatcher) = setup();
        let summary = dispatcher.send_payment_reminders(d(2024, 3, 1)).await.unwrap();
        assert_eq!(summary, DispatchSummary::default());
    }
}
