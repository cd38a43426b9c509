//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn new_sub(name: &str, price: &str, cycle: BillingCycle, category: Option<&str>) -> NewSubscription {
        NewSubscription {
            name: name.to_string(),
            price: price.to_string(),
            billing_cycle: cycle,
            start_date: d(2024, 1, 15),
            next_payment: None,
            category: category.map(String::from),
        }
    }

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_users().unwrap().is_empty());
        assert_eq!(db.count_subscriptions().unwrap(), 0);
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        for table in [
            "users",
            "subscriptions",
            "email_history",
            "user_registry",
            "reminder_log",
            "report_log",
            "one_time_codes",
            "audit_log",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::in_memory().unwrap();
        db.create_user("a@example.com", None).unwrap();

        let reopened = Database::new_unencrypted(db.path()).unwrap();
        assert_eq!(reopened.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_user_defaults() {
        let db = Database::in_memory().unwrap();
        let id = db.create_user("alex@example.com", Some("Alex")).unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.email, "alex@example.com");
        assert_eq!(user.display_name.as_deref(), Some("Alex"));
        assert!(user.notifications.payment_reminders);
        assert_eq!(
            user.notifications.reminder_frequency,
            ReminderFrequency::ThreeDays
        );
        assert!(user.notifications.monthly_reports);
        assert!(!user.security.two_factor_enabled);
        assert!(user.security.login_notifications);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::in_memory().unwrap();
        db.create_user("alex@example.com", None).unwrap();

        let err = db.create_user("ALEX@example.com", None).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)), "{:?}", err);
        assert!(db.create_user("not-an-email", None).is_err());
    }

    #[test]
    fn test_find_user_by_email() {
        let db = Database::in_memory().unwrap();
        let id = db.create_user("alex@example.com", None).unwrap();

        let found = db.find_user_by_email("Alex@Example.com").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_update_preferences() {
        let db = Database::in_memory().unwrap();
        let id = db.create_user("alex@example.com", None).unwrap();

        db.update_notification_preferences(
            id,
            &NotificationPreferences {
                payment_reminders: false,
                reminder_frequency: ReminderFrequency::Weekly,
                monthly_reports: false,
            },
        )
        .unwrap();
        db.update_security_preferences(
            id,
            &SecurityPreferences {
                two_factor_enabled: true,
                always_require_two_factor: true,
                login_notifications: false,
            },
        )
        .unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert!(!user.notifications.payment_reminders);
        assert_eq!(user.notifications.reminder_frequency, ReminderFrequency::Weekly);
        assert!(user.security.two_factor_enabled);
        assert!(user.security.always_require_two_factor);
        assert!(!user.security.login_notifications);

        let missing = db.update_notification_preferences(999, &NotificationPreferences::default());
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_change_email_records_history_and_rebuilds_registry() {
        let db = Database::in_memory().unwrap();
        let id = db.create_user("old@example.com", None).unwrap();

        db.change_user_email(id, "new@example.com").unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.email, "new@example.com");

        let history = db.get_email_history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_email, "old@example.com");
        assert_eq!(history[0].new_email, "new@example.com");

        let registry = db.get_registry(id).unwrap().unwrap();
        assert_eq!(registry.email, "new@example.com");
        assert_eq!(registry.email_history.len(), 1);

        // Same address is a no-op
        db.change_user_email(id, "new@example.com").unwrap();
        assert_eq!(db.get_email_history(id).unwrap().len(), 1);
    }

    #[test]
    fn test_change_email_conflict() {
        let db = Database::in_memory().unwrap();
        db.create_user("taken@example.com", None).unwrap();
        let id = db.create_user("me@example.com", None).unwrap();

        assert!(db.change_user_email(id, "taken@example.com").is_err());
        assert!(db.get_email_history(id).unwrap().is_empty());
    }

    #[test]
    fn test_subscription_crud() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();

        let id = db
            .create_subscription(
                user_id,
                &new_sub("Netflix", "15.99", BillingCycle::Monthly, Some("Entertainment")),
            )
            .unwrap();

        let sub = db.get_subscription(id).unwrap().unwrap();
        assert_eq!(sub.name, "Netflix");
        assert_eq!(sub.price, "15.99");
        assert_eq!(sub.billing_cycle, "Monthly");
        assert_eq!(sub.start_date, "2024-01-15");
        // Next payment defaults to the start date
        assert_eq!(sub.next_payment, "2024-01-15");
        assert_eq!(sub.category.as_deref(), Some("Entertainment"));

        db.update_subscription(
            id,
            &SubscriptionUpdate {
                price: Some("17.99".to_string()),
                category: Some(String::new()),
                ..Default::default()
            },
        )
        .unwrap();
        let sub = db.get_subscription(id).unwrap().unwrap();
        assert_eq!(sub.price, "17.99");
        assert_eq!(sub.name, "Netflix");
        assert!(sub.category.is_none());
        assert_eq!(sub.category_or_default(), "Uncategorized");

        db.delete_subscription(id).unwrap();
        assert!(db.get_subscription(id).unwrap().is_none());
        assert!(matches!(db.delete_subscription(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_create_subscription_validates() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();

        assert!(db
            .create_subscription(user_id, &new_sub("Free", "0", BillingCycle::Monthly, None))
            .is_err());
        assert!(db
            .create_subscription(user_id, &new_sub(" ", "5", BillingCycle::Monthly, None))
            .is_err());
        assert!(db
            .create_subscription(999, &new_sub("Orphan", "5", BillingCycle::Monthly, None))
            .is_err());
        assert!(db.list_subscriptions(user_id).unwrap().is_empty());
    }

    #[test]
    fn test_registry_tracks_subscription_mutations() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();

        let netflix = db
            .create_subscription(
                user_id,
                &new_sub("Netflix", "19.99", BillingCycle::Monthly, Some("Entertainment")),
            )
            .unwrap();
        db.create_subscription(
            user_id,
            &new_sub("Cloud", "120", BillingCycle::Yearly, None),
        )
        .unwrap();

        let registry = db.get_registry(user_id).unwrap().unwrap();
        assert_eq!(registry.subscriptions.len(), 2);
        assert!((registry.total_monthly - 29.99).abs() < 1e-9);

        db.delete_subscription(netflix).unwrap();
        let registry = db.get_registry(user_id).unwrap().unwrap();
        assert_eq!(registry.subscriptions.len(), 1);
        assert_eq!(registry.subscriptions[0].category, "Uncategorized");
        assert!((registry.total_monthly - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_registry_skips_malformed_rows_and_rebuilds_after_clear() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        db.import_subscription_raw(user_id, "Legacy", "free", "Monthly", "2024-01-01", "2024-02-01", None)
            .unwrap();
        db.import_subscription_raw(user_id, "Odd", "4", "Fortnightly", "2024-01-01", "2024-02-01", None)
            .unwrap();

        let registry = db.rebuild_registry(user_id).unwrap();
        assert_eq!(registry.subscriptions.len(), 1);
        assert_eq!(registry.subscriptions[0].billing_cycle, BillingCycle::Biweekly);

        assert_eq!(db.clear_registries().unwrap(), 1);
        assert!(db.get_registry(user_id).unwrap().is_none());

        let rebuilt = db.get_or_rebuild_registry(user_id).unwrap();
        assert_eq!(rebuilt.subscriptions.len(), 1);
        assert_eq!(db.rebuild_all_registries().unwrap(), 1);
    }

    #[test]
    fn test_registry_serves_lapsed_payment_dates_advanced() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        db.import_subscription_raw(
            user_id,
            "Netflix",
            "15.99",
            "Monthly",
            "2023-01-15",
            "2024-01-15",
            None,
        )
        .unwrap();

        let today = Utc::now().date_naive();
        let registry = db.get_or_rebuild_registry(user_id).unwrap();
        assert!(registry.subscriptions[0].next_payment > today);

        // The cached row goes stale as days pass; serving resolves it again
        let later = d(2100, 6, 1);
        let registry = db.registry_as_of(user_id, later).unwrap();
        assert_eq!(registry.subscriptions[0].next_payment, d(2100, 6, 15));

        // Nothing is written back to the subscription itself
        let stored = db.list_subscriptions(user_id).unwrap();
        assert_eq!(stored[0].next_payment, "2024-01-15");
    }

    #[test]
    fn test_registry_respects_custom_cycle_policy() {
        use crate::billing::{BillingNormalizer, CustomCyclePolicy};

        let db = Database::in_memory()
            .unwrap()
            .with_billing(BillingNormalizer::new(CustomCyclePolicy::Exclude));
        let user_id = db.create_user("alex@example.com", None).unwrap();
        db.create_subscription(user_id, &new_sub("Odd", "50", BillingCycle::Custom, None))
            .unwrap();
        db.create_subscription(user_id, &new_sub("Gym", "30", BillingCycle::Monthly, None))
            .unwrap();

        let registry = db.get_registry(user_id).unwrap().unwrap();
        assert_eq!(registry.subscriptions.len(), 1);
        assert!((registry.total_monthly - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_next_payment() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let id = db
            .create_subscription(user_id, &new_sub("Gym", "30", BillingCycle::Monthly, None))
            .unwrap();

        db.set_next_payment(id, d(2024, 3, 15)).unwrap();
        let sub = db.get_subscription(id).unwrap().unwrap();
        assert_eq!(sub.next_payment, "2024-03-15");

        assert!(db.set_next_payment(999, d(2024, 3, 15)).is_err());
    }

    #[test]
    fn test_reminder_watermark() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let id = db
            .create_subscription(user_id, &new_sub("Gym", "30", BillingCycle::Monthly, None))
            .unwrap();
        let today = d(2024, 3, 12);

        assert!(!db.reminder_sent(id, today).unwrap());
        assert!(db.record_reminder(id, today, d(2024, 3, 15), Some("msg-1")).unwrap());
        assert!(db.reminder_sent(id, today).unwrap());
        assert!(!db.record_reminder(id, today, d(2024, 3, 15), Some("msg-2")).unwrap());

        // A different day is a different watermark
        assert!(!db.reminder_sent(id, d(2024, 3, 13)).unwrap());
        assert_eq!(db.count_reminders(id).unwrap(), 1);
    }

    #[test]
    fn test_report_watermark() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();

        assert!(db.get_report_record(user_id, "2024-02").unwrap().is_none());
        assert!(db.record_report(user_id, "2024-02", 29.98, Some("msg-1")).unwrap());
        assert!(!db.record_report(user_id, "2024-02", 99.0, None).unwrap());

        let record = db.get_report_record(user_id, "2024-02").unwrap().unwrap();
        assert_eq!(record.total_spent, 29.98);
        assert_eq!(record.message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn test_code_issue_and_verify() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let now = fixed_now();

        let code = db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        // Stored hashed, never in plaintext
        let stored: String = db
            .conn()
            .unwrap()
            .query_row("SELECT code_hash FROM one_time_codes", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, code);
        assert_eq!(stored.len(), 64);

        let check = db.verify_code(user_id, "login", &code, 5, now).unwrap();
        assert_eq!(check, CodeCheck::Valid);

        // Single use
        let again = db.verify_code(user_id, "login", &code, 5, now).unwrap();
        assert_eq!(again, CodeCheck::Missing);
    }

    #[test]
    fn test_code_wrong_attempts_lock() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let now = fixed_now();

        let code = db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for left in (1..5).rev() {
            let check = db.verify_code(user_id, "login", wrong, 5, now).unwrap();
            assert_eq!(check, CodeCheck::Invalid { attempts_left: left });
        }
        assert_eq!(
            db.verify_code(user_id, "login", wrong, 5, now).unwrap(),
            CodeCheck::Locked
        );
        // The right code no longer works after lockout
        assert_eq!(
            db.verify_code(user_id, "login", &code, 5, now).unwrap(),
            CodeCheck::Missing
        );
    }

    #[test]
    fn test_code_expiry_and_purge() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let now = fixed_now();

        let code = db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        let later = now + Duration::minutes(11);
        assert_eq!(
            db.verify_code(user_id, "login", &code, 5, later).unwrap(),
            CodeCheck::Expired
        );

        db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        db.issue_code(user_id, "email_change", Duration::minutes(30), now).unwrap();
        assert_eq!(db.purge_expired_codes(now + Duration::minutes(5)).unwrap(), 0);
        assert_eq!(db.purge_expired_codes(later).unwrap(), 1);
        assert_eq!(db.purge_expired_codes(now + Duration::hours(1)).unwrap(), 1);
    }

    #[test]
    fn test_reissue_replaces_code() {
        let db = Database::in_memory().unwrap();
        let user_id = db.create_user("alex@example.com", None).unwrap();
        let now = fixed_now();

        let first = db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        let second = db.issue_code(user_id, "login", Duration::minutes(10), now).unwrap();
        if first != second {
            assert!(matches!(
                db.verify_code(user_id, "login", &first, 5, now).unwrap(),
                CodeCheck::Invalid { .. }
            ));
        }
        assert_eq!(
            db.verify_code(user_id, "login", &second, 5, now).unwrap(),
            CodeCheck::Valid
        );
    }

    #[test]
    fn test_audit_log() {
        let db = Database::in_memory().unwrap();
        db.log_audit("cli", "user.create", Some("user"), Some(1), None)
            .unwrap();
        db.log_audit("cron", "reminders.run", None, None, Some("sent=2"))
            .unwrap();

        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "reminders.run");
        assert_eq!(entries[0].details.as_deref(), Some("sent=2"));
        assert_eq!(entries[1].entity_id, Some(1));

        assert_eq!(db.list_audit_log(1).unwrap().len(), 1);
    }
}
