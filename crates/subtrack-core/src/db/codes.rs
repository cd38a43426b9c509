//! One-time verification codes
//!
//! A keyed store with expiry: at most one live code per (user, purpose).
//! Codes are six digits, stored as SHA-256 hashes, consumed on successful
//! verification, and discarded after too many wrong guesses.
//!
//! Callers pass `now` explicitly so expiry can be tested without sleeping.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};

/// Outcome of checking a submitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// Code matched and has been consumed
    Valid,
    /// Wrong code; the stored code remains usable
    Invalid { attempts_left: u32 },
    /// Too many wrong codes; the stored code was discarded
    Locked,
    /// The code expired and was discarded
    Expired,
    /// No code was issued (or it was already used)
    Missing,
}

fn hash_code(user_id: i64, purpose: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", user_id, purpose, code.trim()).as_bytes());
    hex::encode(hasher.finalize())
}

impl Database {
    /// Issue a fresh code, replacing any live code for the same purpose
    ///
    /// Returns the plaintext code; only its hash is stored.
    pub fn issue_code(
        &self,
        user_id: i64,
        purpose: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if ttl <= Duration::zero() {
            return Err(Error::InvalidData("code TTL must be positive".into()));
        }
        self.require_user(user_id)?;

        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO one_time_codes (user_id, purpose, code_hash, attempts, expires_at, created_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(user_id, purpose) DO UPDATE SET
                code_hash = excluded.code_hash,
                attempts = 0,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
            params![
                user_id,
                purpose,
                hash_code(user_id, purpose, &code),
                format_datetime(now + ttl),
                format_datetime(now),
            ],
        )?;

        debug!(user_id, purpose, "Issued one-time code");
        Ok(code)
    }

    /// Check a submitted code
    pub fn verify_code(
        &self,
        user_id: i64,
        purpose: &str,
        code: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<CodeCheck> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, code_hash, attempts, expires_at
                FROM one_time_codes
                WHERE user_id = ? AND purpose = ?
                "#,
                params![user_id, purpose],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, stored_hash, attempts, expires_at)) = row else {
            return Ok(CodeCheck::Missing);
        };

        if parse_datetime(&expires_at) <= now {
            conn.execute("DELETE FROM one_time_codes WHERE id = ?", params![id])?;
            return Ok(CodeCheck::Expired);
        }

        if hash_code(user_id, purpose, code) == stored_hash {
            conn.execute("DELETE FROM one_time_codes WHERE id = ?", params![id])?;
            return Ok(CodeCheck::Valid);
        }

        let attempts = attempts + 1;
        if attempts >= max_attempts {
            conn.execute("DELETE FROM one_time_codes WHERE id = ?", params![id])?;
            info!(user_id, purpose, "One-time code locked after failed attempts");
            return Ok(CodeCheck::Locked);
        }

        conn.execute(
            "UPDATE one_time_codes SET attempts = ? WHERE id = ?",
            params![attempts, id],
        )?;
        Ok(CodeCheck::Invalid {
            attempts_left: max_attempts - attempts,
        })
    }

    /// Delete codes that expired at or before `now`
    pub fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM one_time_codes WHERE expires_at <= ?",
            params![format_datetime(now)],
        )?;
        if deleted > 0 {
            info!(deleted, "Purged expired one-time codes");
        }
        Ok(deleted)
    }
}
