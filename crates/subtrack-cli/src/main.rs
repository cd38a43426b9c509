//! Subtrack CLI - Subscription tracker with payment reminders
//!
//! Usage:
//!   subtrack init                          Initialize database
//!   subtrack users add you@example.com     Register a user
//!   subtrack subs add USER -n Netflix ...  Track a subscription
//!   subtrack remind                        Send due payment reminders
//!   subtrack serve --port 3000             Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let settings = commands::load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt, &settings),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt, &settings),
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            match action {
                UsersAction::Add { email, name } => {
                    commands::cmd_users_add(&db, &email, name.as_deref()).map(|_| ())
                }
                UsersAction::List => commands::cmd_users_list(&db),
                UsersAction::Show { user } => commands::cmd_users_show(&db, &user),
                UsersAction::Prefs {
                    user,
                    reminders,
                    frequency,
                    reports,
                    two_factor,
                    always_two_factor,
                    login_notifications,
                } => commands::cmd_users_prefs(
                    &db,
                    &user,
                    &commands::PrefsUpdate {
                        reminders,
                        frequency: frequency.as_deref(),
                        reports,
                        two_factor,
                        always_two_factor,
                        login_notifications,
                    },
                ),
                UsersAction::Email { user, new_email } => {
                    commands::cmd_users_email(&db, &user, &new_email)
                }
            }
        }
        Commands::Subs { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            match action {
                SubsAction::Add {
                    user,
                    name,
                    price,
                    cycle,
                    start,
                    next,
                    category,
                } => commands::cmd_subs_add(
                    &db,
                    &user,
                    &commands::AddSubscriptionArgs {
                        name: &name,
                        price: &price,
                        cycle: &cycle,
                        start: &start,
                        next: next.as_deref(),
                        category: category.as_deref(),
                    },
                )
                .map(|_| ()),
                SubsAction::List { user, date } => {
                    commands::cmd_subs_list(&db, &user, &settings, date.as_deref()).map(|_| ())
                }
                SubsAction::Edit {
                    id,
                    name,
                    price,
                    cycle,
                    start,
                    next,
                    category,
                } => commands::cmd_subs_edit(
                    &db,
                    id,
                    &commands::EditSubscriptionArgs {
                        name: name.as_deref(),
                        price: price.as_deref(),
                        cycle: cycle.as_deref(),
                        start: start.as_deref(),
                        next: next.as_deref(),
                        category: category.as_deref(),
                    },
                ),
                SubsAction::Delete { id } => commands::cmd_subs_delete(&db, id),
            }
        }
        Commands::Summary { user, date, json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            commands::cmd_summary(&db, &user, date.as_deref(), json, &settings)
        }
        Commands::Remind { date } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            let email = commands::email_from_env(&settings)?;
            commands::cmd_remind(&db, email, &settings, date.as_deref())
                .await
                .map(|_| ())
        }
        Commands::Report { date } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            let email = commands::email_from_env(&settings)?;
            commands::cmd_report(&db, email, &settings, date.as_deref())
                .await
                .map(|_| ())
        }
        Commands::Registry { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            match action {
                RegistryAction::Rebuild { user } => {
                    commands::cmd_registry_rebuild(&db, user.as_deref()).map(|_| ())
                }
            }
        }
        Commands::Codes { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            match action {
                CodesAction::Send { user, purpose } => {
                    let email = commands::email_from_env(&settings)?;
                    commands::cmd_codes_send(&db, email, &settings, &user, &purpose).await
                }
                CodesAction::Verify {
                    user,
                    code,
                    purpose,
                } => commands::cmd_codes_verify(&db, &settings, &user, &code, &purpose).map(|_| ()),
                CodesAction::Purge => commands::cmd_codes_purge(&db).map(|_| ()),
            }
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            commands::cmd_audit(&db, limit)
        }
        Commands::Serve {
            port,
            host,
            no_auth,
            allowed_origins,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt, &settings)?;
            let email = commands::email_from_env(&settings)?;
            commands::cmd_serve(db, email, settings, &host, port, no_auth, allowed_origins).await
        }
    }
}
