//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `load_settings` / `open_db` - Shared utilities used by every command
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database status
//! - `cmd_audit` - Audit log viewer

use std::path::Path;

use anyhow::{Context, Result};
use subtrack_core::db::{Database, DB_KEY_ENV};
use subtrack_core::Settings;

use super::truncate;

/// Load settings from `--config`, the user config dir, or the built-in defaults
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    Settings::load(config_path).context("Failed to load settings")
}

/// Open database with encryption by default, or unencrypted if --no-encrypt
///
/// Registry rebuilds use the billing policy from `settings`.
pub fn open_db(db_path: &Path, no_encrypt: bool, settings: &Settings) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    let db = if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")?
    } else {
        Database::new(path_str).context("Failed to open database")?
    };
    Ok(db.with_billing(settings.normalizer()))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool, settings: &Settings) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt, settings)?;
    db.log_audit("cli", "init", None, None, None)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a user: subtrack users add you@example.com");
    println!("  2. Add a subscription: subtrack subs add you@example.com -n Netflix -p 15.99 -s 2024-01-15");
    println!("  3. Start the server: subtrack serve");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool, settings: &Settings) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Subtrack Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt, settings) {
            Ok(db) => {
                println!();
                if !no_encrypt {
                    println!("   Encrypted: {}", if db.is_encrypted()? { "yes" } else { "no" });
                }
                println!("   Users: {}", db.list_users()?.len());
                println!("   Subscriptions: {}", db.count_subscriptions()?);
                println!("   Custom cycle policy: {:?}", settings.billing.custom_cycle);
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit.max(1))?;

    if entries.is_empty() {
        println!("No audit entries yet.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log (last {})", entries.len());
    println!("   ─────────────────────────────────────────────────────────────");

    for entry in entries {
        let target = match (&entry.entity_type, entry.entity_id) {
            (Some(kind), Some(id)) => format!("{} #{}", kind, id),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        println!(
            "   {} │ {:10} │ {:18} │ {:16} │ {}",
            entry.timestamp,
            truncate(&entry.actor, 10),
            truncate(&entry.action, 18),
            truncate(&target, 16),
            entry.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
