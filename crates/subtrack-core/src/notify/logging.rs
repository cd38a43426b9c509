//! Log-only backend for development
//!
//! Nothing leaves the process; each message is written to the log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;

use super::{EmailBackend, EmailMessage};

#[derive(Clone, Default)]
pub struct LogEmailBackend {
    counter: Arc<AtomicU64>,
}

impl LogEmailBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmailBackend for LogEmailBackend {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        info!(to = %message.to, subject = %message.subject, "Email (not sent, log backend)");
        tracing::debug!(body = %message.text);
        Ok(format!("log-{}", n))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
