//! Pluggable email delivery and notification dispatch
//!
//! # Architecture
//!
//! - `EmailBackend` trait: sends one rendered message
//! - `EmailClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `HttpEmailBackend`, `LogEmailBackend`, `MockEmailBackend`
//! - `NotificationDispatcher`: per-user fan-out of payment reminders and
//!   monthly reports
//!
//! # Configuration
//!
//! Environment variables:
//! - `EMAIL_BACKEND`: Backend to use (http, log, mock). Default: http when
//!   `EMAIL_API_URL` is set, otherwise log
//! - `EMAIL_API_URL`: Base URL of the transactional email API (required for http)
//! - `EMAIL_API_KEY`: Bearer key for the email API (required for http)
//! - `EMAIL_FROM`: Sender address (overrides `[email] from`)

mod dispatcher;
mod http;
mod logging;
mod mock;
pub mod templates;

pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use http::HttpEmailBackend;
pub use logging::LogEmailBackend;
pub use mock::MockEmailBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmailSettings;
use crate::error::{Error, Result};

/// A rendered email ready to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Interface for all email backends
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Send a message, returning the provider's message id
    async fn send(&self, message: &EmailMessage) -> Result<String>;

    /// Backend name (for logging)
    fn name(&self) -> &'static str;
}

/// Concrete email client enum
#[derive(Clone)]
pub enum EmailClient {
    /// Transactional email HTTP API
    Http(HttpEmailBackend),
    /// Logs messages instead of sending them (development)
    Log(LogEmailBackend),
    /// Records messages in memory (tests)
    Mock(MockEmailBackend),
}

impl EmailClient {
    /// Create an email client from environment variables
    ///
    /// The sender falls back to `settings.from` when `EMAIL_FROM` is unset.
    pub fn from_env(settings: &EmailSettings) -> Result<Self> {
        let api_url = std::env::var("EMAIL_API_URL").ok();
        let backend = std::env::var("EMAIL_BACKEND").unwrap_or_else(|_| {
            if api_url.is_some() { "http" } else { "log" }.to_string()
        });
        let from = std::env::var("EMAIL_FROM").unwrap_or_else(|_| settings.from.clone());

        match backend.to_lowercase().as_str() {
            "http" => {
                let url = api_url.ok_or_else(|| {
                    Error::Config("EMAIL_BACKEND=http requires EMAIL_API_URL".into())
                })?;
                let key = std::env::var("EMAIL_API_KEY").map_err(|_| {
                    Error::Config("EMAIL_BACKEND=http requires EMAIL_API_KEY".into())
                })?;
                Self::http(&url, &key, &from, settings)
            }
            "log" => Ok(Self::Log(LogEmailBackend::new())),
            "mock" => Ok(Self::mock()),
            other => Err(Error::Config(format!(
                "Unknown EMAIL_BACKEND: {} (valid: http, log, mock)",
                other
            ))),
        }
    }

    /// Create an HTTP backend directly
    pub fn http(base_url: &str, api_key: &str, from: &str, settings: &EmailSettings) -> Result<Self> {
        Ok(Self::Http(HttpEmailBackend::new(
            base_url,
            api_key,
            from,
            settings.timeout(),
        )?))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        Self::Mock(MockEmailBackend::new())
    }
}

#[async_trait]
impl EmailBackend for EmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        match self {
            Self::Http(b) => b.send(message).await,
            Self::Log(b) => b.send(message).await,
            Self::Mock(b) => b.send(message).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Http(b) => b.name(),
            Self::Log(b) => b.name(),
            Self::Mock(b) => b.name(),
        }
    }
}
