//! Registry commands

use anyhow::Result;
use subtrack_core::db::Database;

use super::resolve_user;

/// Rebuild one user's registry, or every user's when `user` is None
pub fn cmd_registry_rebuild(db: &Database, user: Option<&str>) -> Result<usize> {
    let rebuilt = match user {
        Some(u) => {
            let user = resolve_user(db, u)?;
            let registry = db.rebuild_registry(user.id)?;
            println!(
                "✅ Rebuilt registry for {} ({} subscriptions, ${:.2}/mo)",
                registry.email,
                registry.subscriptions.len(),
                registry.total_monthly
            );
            1
        }
        None => {
            let count = db.rebuild_all_registries()?;
            println!("✅ Rebuilt {} registr{}", count, if count == 1 { "y" } else { "ies" });
            count
        }
    };

    db.log_audit(
        "cli",
        "rebuild",
        Some("registry"),
        None,
        Some(&format!("count={}", rebuilt)),
    )?;
    Ok(rebuilt)
}
