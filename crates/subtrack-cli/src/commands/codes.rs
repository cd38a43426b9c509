//! One-time verification code commands

use anyhow::Result;
use chrono::Utc;
use subtrack_core::db::{CodeCheck, Database};
use subtrack_core::notify::{EmailClient, NotificationDispatcher};
use subtrack_core::Settings;

use super::resolve_user;

pub async fn cmd_codes_send(
    db: &Database,
    email: EmailClient,
    settings: &Settings,
    user: &str,
    purpose: &str,
) -> Result<()> {
    let user = resolve_user(db, user)?;
    let dispatcher = NotificationDispatcher::new(db.clone(), email, settings.clone());

    let message_id = dispatcher
        .send_verification_code(user.id, purpose, Utc::now())
        .await?;
    db.log_audit(
        "cli",
        "send_code",
        Some("user"),
        Some(user.id),
        Some(&format!("purpose={}", purpose)),
    )?;

    println!(
        "✅ Sent {} code to {} (message {}), valid for {} minutes",
        purpose, user.email, message_id, settings.codes.ttl_minutes
    );
    Ok(())
}

pub fn cmd_codes_verify(
    db: &Database,
    settings: &Settings,
    user: &str,
    code: &str,
    purpose: &str,
) -> Result<CodeCheck> {
    let user = resolve_user(db, user)?;
    let check = db.verify_code(user.id, purpose, code, settings.codes.max_attempts, Utc::now())?;

    db.log_audit(
        "cli",
        "verify_code",
        Some("user"),
        Some(user.id),
        Some(&format!("purpose={}, result={:?}", purpose, check)),
    )?;

    match check {
        CodeCheck::Valid => println!("✅ Code accepted"),
        CodeCheck::Invalid { attempts_left } => {
            println!("❌ Wrong code ({} attempt(s) left)", attempts_left)
        }
        CodeCheck::Locked => println!("🔒 Too many wrong codes; request a new one"),
        CodeCheck::Expired => println!("⌛ Code expired; request a new one"),
        CodeCheck::Missing => println!("❓ No {} code pending for {}", purpose, user.email),
    }
    Ok(check)
}

pub fn cmd_codes_purge(db: &Database) -> Result<usize> {
    let purged = db.purge_expired_codes(Utc::now())?;
    db.log_audit(
        "cli",
        "purge_codes",
        None,
        None,
        Some(&format!("purged={}", purged)),
    )?;
    println!("🧹 Purged {} expired code(s)", purged);
    Ok(purged)
}
