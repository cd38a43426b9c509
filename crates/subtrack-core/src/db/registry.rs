//! Derived user registry
//!
//! The registry is a cache of each user's current email, email history,
//! and subscription summaries. It is never authoritative: every row can be
//! deleted and rebuilt from the users and subscriptions tables.
//!
//! Rows hold the stored next-payment dates, which go stale as days pass.
//! They are resolved against the serving day in [`Database::registry_as_of`].

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{RegistrySubscription, UserRegistry};
use crate::recurrence::resolve_next_payment;

impl Database {
    /// Rebuild one user's registry from the source tables
    pub fn rebuild_registry(&self, user_id: i64) -> Result<UserRegistry> {
        let user = self.require_user(user_id)?;
        let email_history = self.get_email_history(user_id)?;

        let mut subscriptions = Vec::new();
        for sub in self.list_subscriptions(user_id)? {
            let parsed = match sub.parse() {
                Ok(p) => p,
                Err(e) => {
                    warn!(subscription_id = sub.id, error = %e, "Registry skipping malformed subscription");
                    continue;
                }
            };
            if !self.billing.includes(parsed.cycle) {
                continue;
            }
            subscriptions.push(RegistrySubscription {
                id: parsed.id,
                monthly_equivalent: self.billing.monthly_equivalent(parsed.price, parsed.cycle),
                name: parsed.name,
                price: parsed.price,
                billing_cycle: parsed.cycle,
                category: parsed.category,
                start_date: parsed.start_date,
                next_payment: parsed.next_payment,
            });
        }

        let registry = UserRegistry {
            user_id,
            total_monthly: subscriptions.iter().map(|s| s.monthly_equivalent).sum(),
            email: user.email,
            email_history,
            subscriptions,
            rebuilt_at: Utc::now(),
        };

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO user_registry (user_id, email, email_history, subscriptions, total_monthly, rebuilt_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                email = excluded.email,
                email_history = excluded.email_history,
                subscriptions = excluded.subscriptions,
                total_monthly = excluded.total_monthly,
                rebuilt_at = excluded.rebuilt_at
            "#,
            params![
                user_id,
                registry.email,
                serde_json::to_string(&registry.email_history)?,
                serde_json::to_string(&registry.subscriptions)?,
                registry.total_monthly,
                format_datetime(registry.rebuilt_at),
            ],
        )?;

        debug!(user_id, subscriptions = registry.subscriptions.len(), "Rebuilt registry");
        Ok(registry)
    }

    /// Rebuild every user's registry, returning how many were rebuilt
    pub fn rebuild_all_registries(&self) -> Result<usize> {
        let users = self.list_users()?;
        for user in &users {
            self.rebuild_registry(user.id)?;
        }
        info!(users = users.len(), "Rebuilt all registries");
        Ok(users.len())
    }

    /// Stored registry for a user, if one has been built
    pub fn get_registry(&self, user_id: i64) -> Result<Option<UserRegistry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT email, email_history, subscriptions, total_monthly, rebuilt_at
                FROM user_registry
                WHERE user_id = ?
                "#,
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((email, history_json, subs_json, total_monthly, rebuilt_at)) = row else {
            return Ok(None);
        };

        Ok(Some(UserRegistry {
            user_id,
            email,
            email_history: serde_json::from_str(&history_json)?,
            subscriptions: serde_json::from_str(&subs_json)?,
            total_monthly,
            rebuilt_at: parse_datetime(&rebuilt_at),
        }))
    }

    /// Registry for serving today, rebuilding it first when missing
    pub fn get_or_rebuild_registry(&self, user_id: i64) -> Result<UserRegistry> {
        self.registry_as_of(user_id, Utc::now().date_naive())
    }

    /// Registry with every next payment resolved to after `today`
    ///
    /// Builds the registry when it is missing. Resolved dates are returned,
    /// not written back.
    pub fn registry_as_of(&self, user_id: i64, today: NaiveDate) -> Result<UserRegistry> {
        let mut registry = match self.get_registry(user_id)? {
            Some(registry) => registry,
            None => self.rebuild_registry(user_id)?,
        };

        registry.subscriptions.retain_mut(|sub| {
            match resolve_next_payment(
                sub.start_date,
                sub.next_payment,
                self.billing.step(sub.billing_cycle),
                today,
            ) {
                Ok(next) => {
                    sub.next_payment = next;
                    true
                }
                Err(e) => {
                    warn!(subscription_id = sub.id, error = %e, "Registry dropping unadvanceable subscription");
                    false
                }
            }
        });
        registry.total_monthly = registry
            .subscriptions
            .iter()
            .map(|s| s.monthly_equivalent)
            .sum();

        Ok(registry)
    }

    /// Drop all registry rows
    pub fn clear_registries(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM user_registry", [])?;
        Ok(deleted)
    }
}
