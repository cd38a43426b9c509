//! Transactional email API backend
//!
//! Posts JSON to `{base_url}/emails`:
//!
//! ```json
//! {"from": "...", "to": ["..."], "subject": "...", "html": "...", "text": "..."}
//! ```
//!
//! and expects `{"id": "..."}` back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{EmailBackend, EmailMessage};

#[derive(Clone)]
pub struct HttpEmailBackend {
    http_client: Client,
    base_url: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl HttpEmailBackend {
    /// Create a backend; every request is bounded by `timeout`
    pub fn new(base_url: &str, api_key: &str, from: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl EmailBackend for HttpEmailBackend {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let request = SendRequest {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };

        let response = self
            .http_client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Email(format!(
                "email API returned {}: {}",
                status,
                body.trim()
            )));
        }

        let sent: SendResponse = response.json().await?;
        debug!(id = %sent.id, to = %message.to, "Email accepted by API");
        Ok(sent.id)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
