//! Recording backend for tests
//!
//! Keeps every sent message in memory. Recipients registered with
//! [`MockEmailBackend::fail_for`] get an error instead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{EmailBackend, EmailMessage};

#[derive(Clone, Default)]
pub struct MockEmailBackend {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockEmailBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to `recipient` fail
    pub fn fail_for(&self, recipient: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(recipient.to_string());
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == recipient)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl EmailBackend for MockEmailBackend {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let should_fail = self
            .failing
            .lock()
            .map(|f| f.contains(&message.to))
            .unwrap_or(false);
        if should_fail {
            return Err(Error::Email(format!("mock failure for {}", message.to)));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| Error::Email("mock mailbox lock poisoned".into()))?;
        sent.push(message.clone());
        Ok(format!("mock-{}", sent.len()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
