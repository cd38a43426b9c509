//! Server command implementation

use anyhow::Result;
use subtrack_core::db::Database;
use subtrack_core::notify::{EmailBackend, EmailClient};
use subtrack_core::Settings;
use subtrack_server::{parse_api_keys, ServerConfig, CRON_SECRET_ENV};

pub async fn cmd_serve(
    db: Database,
    email: EmailClient,
    settings: Settings,
    host: &str,
    port: u16,
    no_auth: bool,
    allowed_origins: Vec<String>,
) -> Result<()> {
    println!("🚀 Starting Subtrack web server...");
    println!("   Database: {}", db.path());
    println!("   Listening: http://{}:{}", host, port);
    println!("   Email backend: {}", email.name());

    // Parse API keys from environment (comma-separated)
    let api_keys = parse_api_keys(&std::env::var("SUBTRACK_API_KEYS").unwrap_or_default());
    let cron_secret = std::env::var(CRON_SECRET_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   🔒 Authentication: API key (none configured - set SUBTRACK_API_KEYS)");
    } else {
        println!(
            "   🔑 API keys: {} configured (SUBTRACK_API_KEYS)",
            api_keys.len()
        );
    }
    if cron_secret.is_some() {
        println!("   ⏰ Cron triggers: enabled ({})", CRON_SECRET_ENV);
    } else {
        println!("   ⏰ Cron triggers: disabled (set {})", CRON_SECRET_ENV);
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let config = ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
        cron_secret,
    };

    subtrack_server::serve_with_config(db, email, settings, host, port, config).await?;

    Ok(())
}
