//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Subtrack - Track subscriptions and get reminded before they renew
#[derive(Parser)]
#[command(name = "subtrack")]
#[command(about = "Self-hosted subscription tracker with payment reminders", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "subtrack.db", global = true)]
    pub db: PathBuf,

    /// Settings file (defaults to the user config dir, then built-in defaults)
    #[arg(long, env = "SUBTRACK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SUBTRACK_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, counts)
    Status,

    /// Manage users
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Manage a user's subscriptions
    Subs {
        #[command(subcommand)]
        action: SubsAction,
    },

    /// Show a user's spending summary
    Summary {
        /// User ID or email
        user: String,

        /// Evaluate as of this date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Send payment reminders that are due
    Remind {
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Send monthly reports for the previous month
    Report {
        /// Run as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Manage the per-user subscription registry
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// One-time verification codes
    Codes {
        #[command(subcommand)]
        action: CodesAction,
    },

    /// View audit log
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API key authentication on user routes (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// Cron routes always require SUBTRACK_CRON_SECRET.
        #[arg(long)]
        no_auth: bool,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// Register a user
    Add {
        /// Email address
        email: String,

        /// Display name used in emails
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List users
    List,

    /// Show a user with preferences and email history
    Show {
        /// User ID or email
        user: String,
    },

    /// Update notification and security preferences
    Prefs {
        /// User ID or email
        user: String,

        /// Payment reminders on/off
        #[arg(long)]
        reminders: Option<bool>,

        /// Reminder frequency: daily, weekly, 3days
        #[arg(long)]
        frequency: Option<String>,

        /// Monthly reports on/off
        #[arg(long)]
        reports: Option<bool>,

        /// Two-factor authentication on/off
        #[arg(long)]
        two_factor: Option<bool>,

        /// Require two-factor on every login
        #[arg(long)]
        always_two_factor: Option<bool>,

        /// Login notification emails on/off
        #[arg(long)]
        login_notifications: Option<bool>,
    },

    /// Change a user's email address
    Email {
        /// User ID or current email
        user: String,

        /// New email address
        new_email: String,
    },
}

#[derive(Subcommand)]
pub enum SubsAction {
    /// Add a subscription
    Add {
        /// User ID or email
        user: String,

        /// Service name (e.g., "Netflix")
        #[arg(short, long)]
        name: String,

        /// Price per billing cycle (e.g., "15.99")
        #[arg(short, long)]
        price: String,

        /// Billing cycle: weekly, biweekly, monthly, quarterly, yearly, custom
        #[arg(short, long, default_value = "monthly")]
        cycle: String,

        /// First payment date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// Next payment date (YYYY-MM-DD, defaults to start)
        #[arg(long)]
        next: Option<String>,

        /// Category (e.g., "Entertainment")
        #[arg(long)]
        category: Option<String>,
    },

    /// List a user's subscriptions
    List {
        /// User ID or email
        user: String,

        /// Day to resolve next payments against (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Edit a subscription
    Edit {
        /// Subscription ID
        id: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        price: Option<String>,

        #[arg(short, long)]
        cycle: Option<String>,

        /// First payment date (YYYY-MM-DD)
        #[arg(short, long)]
        start: Option<String>,

        /// Next payment date (YYYY-MM-DD)
        #[arg(long)]
        next: Option<String>,

        /// Category (empty string clears it)
        #[arg(long)]
        category: Option<String>,
    },

    /// Delete a subscription
    Delete {
        /// Subscription ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RegistryAction {
    /// Rebuild registries from the subscriptions table
    Rebuild {
        /// Only this user (ID or email); all users if omitted
        user: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CodesAction {
    /// Issue a code and email it to the user
    Send {
        /// User ID or email
        user: String,

        /// What the code authorizes (e.g., login, email_change)
        #[arg(long, default_value = "login")]
        purpose: String,
    },

    /// Check a code
    Verify {
        /// User ID or email
        user: String,

        /// The six-digit code
        code: String,

        #[arg(long, default_value = "login")]
        purpose: String,
    },

    /// Delete expired codes
    Purge,
}
