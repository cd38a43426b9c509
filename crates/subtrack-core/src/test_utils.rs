//! Test utilities for subtrack-core
//!
//! This module provides a mock transactional email API server that speaks
//! the same JSON protocol as the HTTP email backend.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// API key the mock server accepts
pub const MOCK_EMAIL_API_KEY: &str = "test-email-key";

/// An email as received by the mock server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Clone, Default)]
struct MockState {
    received: Arc<Mutex<Vec<ReceivedEmail>>>,
    fail_with: Option<StatusCode>,
}

/// Mock email API server for testing and development
pub struct MockEmailServer {
    addr: SocketAddr,
    state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockEmailServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(MockState::default()).await
    }

    /// Start a server that answers every send with `status`
    pub async fn start_failing(status: StatusCode) -> Self {
        Self::start_with(MockState {
            fail_with: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn start_with(state: MockState) -> Self {
        let app = Router::new()
            .route("/emails", post(handle_send))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Emails received so far
    pub fn received(&self) -> Vec<ReceivedEmail> {
        self.state.received.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockEmailServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Serialize)]
struct SendResponse {
    id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Email API send endpoint
async fn handle_send(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(email): Json<ReceivedEmail>,
) -> Result<Json<SendResponse>, (StatusCode, Json<ErrorResponse>)> {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", MOCK_EMAIL_API_KEY))
        .unwrap_or(false);
    if !authorized {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                message: "invalid API key".to_string(),
            }),
        ));
    }

    if let Some(status) = state.fail_with {
        return Err((
            status,
            Json(ErrorResponse {
                message: "mock failure".to_string(),
            }),
        ));
    }

    let mut received = state.received.lock().unwrap();
    received.push(email);
    Ok(Json(SendResponse {
        id: format!("email_{}", received.len()),
    }))
}
