//! User operations

use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{EmailChange, NotificationPreferences, SecurityPreferences, User};

const USER_COLUMNS: &str = "id, email, display_name, payment_reminders, reminder_frequency, \
     monthly_reports, two_factor_enabled, always_require_two_factor, login_notifications, created_at";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let frequency: String = row.get(4)?;
    let created_at: String = row.get(9)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        notifications: NotificationPreferences {
            payment_reminders: row.get(3)?,
            reminder_frequency: frequency.parse().unwrap_or_default(),
            monthly_reports: row.get(5)?,
        },
        security: SecurityPreferences {
            two_factor_enabled: row.get(6)?,
            always_require_two_factor: row.get(7)?,
            login_notifications: row.get(8)?,
        },
        created_at: parse_datetime(&created_at),
    })
}

/// Map a UNIQUE violation on `users.email` to a readable error
fn email_conflict(err: rusqlite::Error, email: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::InvalidData(format!("email already registered: {}", email))
        }
        _ => Error::Database(err),
    }
}

fn validate_email(email: &str) -> Result<()> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::InvalidData(format!("invalid email address: {:?}", email))),
    }
}

impl Database {
    /// Create a user with default preferences
    pub fn create_user(&self, email: &str, display_name: Option<&str>) -> Result<i64> {
        validate_email(email)?;
        let email = email.trim();
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO users (email, display_name) VALUES (?, ?)",
            params![email, display_name.map(str::trim).filter(|n| !n.is_empty())],
        )
        .map_err(|e| email_conflict(e, email))?;

        let id = conn.last_insert_rowid();
        drop(conn);
        info!(user_id = id, "Created user");

        self.rebuild_registry(id)?;
        Ok(id)
    }

    /// Get a user by ID
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a user by ID, failing if absent
    pub fn require_user(&self, id: i64) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))
    }

    /// Find a user by email (case-insensitive)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
                params![email.trim()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users, oldest first
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Replace a user's notification preferences
    pub fn update_notification_preferences(
        &self,
        user_id: i64,
        prefs: &NotificationPreferences,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE users
            SET payment_reminders = ?, reminder_frequency = ?, monthly_reports = ?
            WHERE id = ?
            "#,
            params![
                prefs.payment_reminders,
                prefs.reminder_frequency.as_str(),
                prefs.monthly_reports,
                user_id
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    /// Replace a user's security preferences
    pub fn update_security_preferences(
        &self,
        user_id: i64,
        prefs: &SecurityPreferences,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE users
            SET two_factor_enabled = ?, always_require_two_factor = ?, login_notifications = ?
            WHERE id = ?
            "#,
            params![
                prefs.two_factor_enabled,
                prefs.always_require_two_factor,
                prefs.login_notifications,
                user_id
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    /// Change a user's email, recording the old address in the history
    ///
    /// Rebuilds the user's registry. Changing to the current address is a
    /// no-op.
    pub fn change_user_email(&self, user_id: i64, new_email: &str) -> Result<()> {
        validate_email(new_email)?;
        let new_email = new_email.trim();
        let user = self.require_user(user_id)?;
        if user.email == new_email {
            return Ok(());
        }

        {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE users SET email = ? WHERE id = ?",
                params![new_email, user_id],
            )
            .map_err(|e| email_conflict(e, new_email))?;
            tx.execute(
                "INSERT INTO email_history (user_id, old_email, new_email) VALUES (?, ?, ?)",
                params![user_id, user.email, new_email],
            )?;
            tx.commit()?;
        }

        info!(user_id, "Changed user email");
        self.rebuild_registry(user_id)?;
        Ok(())
    }

    /// Email changes for a user, oldest first
    pub fn get_email_history(&self, user_id: i64) -> Result<Vec<EmailChange>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT old_email, new_email, changed_at
            FROM email_history
            WHERE user_id = ?
            ORDER BY id
            "#,
        )?;
        let history = stmt
            .query_map(params![user_id], |row| {
                let changed_at: String = row.get(2)?;
                Ok(EmailChange {
                    old_email: row.get(0)?,
                    new_email: row.get(1)?,
                    changed_at: parse_datetime(&changed_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(history)
    }
}
