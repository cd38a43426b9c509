//! Subscription operations
//!
//! Every mutation rebuilds the owning user's registry.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewSubscription, Subscription, SubscriptionUpdate};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, name, price, billing_cycle, start_date, \
     next_payment, category, created_at, updated_at";

fn row_to_subscription(row: &Row) -> rusqlite::Result<Subscription> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        billing_cycle: row.get(4)?,
        start_date: row.get(5)?,
        next_payment: row.get(6)?,
        category: row.get(7)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

/// Blank categories are stored as NULL
fn normalize_category(category: Option<&str>) -> Option<&str> {
    category.map(str::trim).filter(|c| !c.is_empty())
}

impl Database {
    /// Create a validated subscription for a user
    pub fn create_subscription(&self, user_id: i64, new: &NewSubscription) -> Result<i64> {
        new.validate()?;
        self.require_user(user_id)?;

        let next_payment = new.next_payment.unwrap_or(new.start_date);
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO subscriptions (user_id, name, price, billing_cycle, start_date, next_payment, category)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                new.name.trim(),
                new.price.trim(),
                new.billing_cycle.as_str(),
                new.start_date.to_string(),
                next_payment.to_string(),
                normalize_category(new.category.as_deref()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        info!(user_id, subscription_id = id, "Created subscription");
        self.rebuild_registry(user_id)?;
        Ok(id)
    }

    /// Insert a subscription row exactly as given, without validation
    ///
    /// Used for importing records kept by other systems, which may not
    /// parse. Readers skip such rows.
    pub fn import_subscription_raw(
        &self,
        user_id: i64,
        name: &str,
        price: &str,
        billing_cycle: &str,
        start_date: &str,
        next_payment: &str,
        category: Option<&str>,
    ) -> Result<i64> {
        self.require_user(user_id)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO subscriptions (user_id, name, price, billing_cycle, start_date, next_payment, category)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![user_id, name, price, billing_cycle, start_date, next_payment, category],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.rebuild_registry(user_id)?;
        Ok(id)
    }

    /// Get a subscription by ID
    pub fn get_subscription(&self, id: i64) -> Result<Option<Subscription>> {
        let conn = self.conn()?;
        let sub = conn
            .query_row(
                &format!(
                    "SELECT {} FROM subscriptions WHERE id = ?",
                    SUBSCRIPTION_COLUMNS
                ),
                params![id],
                row_to_subscription,
            )
            .optional()?;
        Ok(sub)
    }

    /// List a user's subscriptions in creation order
    pub fn list_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = ? ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))?;
        let subs = stmt
            .query_map(params![user_id], row_to_subscription)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subs)
    }

    /// Count subscriptions across all users
    pub fn count_subscriptions(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Apply a partial update
    pub fn update_subscription(&self, id: i64, update: &SubscriptionUpdate) -> Result<()> {
        update.validate()?;
        let existing = self
            .get_subscription(id)?
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;

        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(existing.name.as_str());
        let price = update
            .price
            .as_deref()
            .map(str::trim)
            .unwrap_or(existing.price.as_str());
        let billing_cycle = update
            .billing_cycle
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| existing.billing_cycle.clone());
        let start_date = update
            .start_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| existing.start_date.clone());
        let next_payment = update
            .next_payment
            .map(|d| d.to_string())
            .unwrap_or_else(|| existing.next_payment.clone());
        let category = match &update.category {
            Some(c) => normalize_category(Some(c.as_str())),
            None => existing.category.as_deref(),
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE subscriptions
            SET name = ?, price = ?, billing_cycle = ?, start_date = ?, next_payment = ?,
                category = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![name, price, billing_cycle, start_date, next_payment, category, id],
        )?;
        drop(conn);

        info!(subscription_id = id, "Updated subscription");
        self.rebuild_registry(existing.user_id)?;
        Ok(())
    }

    /// Delete a subscription
    pub fn delete_subscription(&self, id: i64) -> Result<()> {
        let existing = self
            .get_subscription(id)?
            .ok_or_else(|| Error::NotFound(format!("subscription {}", id)))?;

        let conn = self.conn()?;
        conn.execute("DELETE FROM subscriptions WHERE id = ?", params![id])?;
        drop(conn);

        info!(subscription_id = id, "Deleted subscription");
        self.rebuild_registry(existing.user_id)?;
        Ok(())
    }

    /// Persist an advanced next-payment date
    ///
    /// Does not rebuild the registry; callers advancing several rows
    /// rebuild once afterwards.
    pub fn set_next_payment(&self, id: i64, next_payment: NaiveDate) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE subscriptions
            SET next_payment = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![next_payment.to_string(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("subscription {}", id)));
        }
        debug!(subscription_id = id, %next_payment, "Advanced next payment");
        Ok(())
    }
}
