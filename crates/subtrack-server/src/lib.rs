//! Subtrack Web Server
//!
//! Axum-based REST API for Subtrack.
//!
//! Security features:
//! - API key authentication for user data (secure by default, use --no-auth for local dev)
//! - Cron trigger endpoints guarded by a separate shared secret
//! - Restrictive CORS policy
//! - Audit logging for API access
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use subtrack_core::db::Database;
use subtrack_core::notify::{EmailBackend, EmailClient, NotificationDispatcher};
use subtrack_core::Settings;

mod handlers;
mod scheduler;

pub use scheduler::{start_notify_scheduler, NotifyScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Environment variable holding the cron trigger secret
pub const CRON_SECRET_ENV: &str = "SUBTRACK_CRON_SECRET";

/// Authorization header for API key and cron secret auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether API key authentication is required on user data routes (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys for user data routes
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
    /// Shared secret for the cron trigger routes
    /// Cron routes reject every request when unset, regardless of `require_auth`
    pub cron_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            cron_secret: None,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub email: EmailClient,
    pub settings: Settings,
    pub config: ServerConfig,
}

impl AppState {
    /// A dispatcher sharing this state's database and email backend
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.db.clone(), self.email.clone(), self.settings.clone())
    }
}

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|s| s.trim())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Authentication middleware for user data routes
///
/// API keys are compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = bearer_token(request.headers())
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = "api-key", path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    unauthorized()
}

/// Authentication middleware for cron trigger routes
///
/// Requests are rejected before any processing unless the bearer token
/// matches the configured cron secret.
async fn cron_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        warn!(
            path = %request.uri().path(),
            "Cron trigger rejected: {} is not configured", CRON_SECRET_ENV
        );
        return unauthorized();
    };

    let valid = bearer_token(request.headers())
        .map(|token| constant_time_eq(token, secret))
        .unwrap_or(false);

    if !valid {
        warn!(path = %request.uri().path(), "Cron trigger rejected: bad secret");
        return unauthorized();
    }

    next.run(request).await
}

fn constant_time_eq(provided: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();
    // Only compare if lengths match (constant-time for same-length values)
    provided_bytes.len() == expected_bytes.len() && provided_bytes.ct_eq(expected_bytes).into()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    valid_keys
        .iter()
        .any(|key| !key.is_empty() && constant_time_eq(provided, key))
}

/// Parse a comma-separated list of API keys
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Identify the caller for audit logging
/// Returns "api-key" for authenticated callers, or "local-dev" when auth is off
pub fn get_actor(headers: &axum::http::HeaderMap) -> String {
    if bearer_token(headers).is_some() {
        return "api-key".to_string();
    }
    "local-dev".to_string()
}

/// Create the application router
pub fn create_router(db: Database, email: EmailClient, settings: Settings, config: ServerConfig) -> Router {
    info!("Email backend: {}", email.name());

    let cors = build_cors(&config);
    let state = Arc::new(AppState {
        db,
        email,
        settings,
        config,
    });

    // User data routes (API key auth)
    let user_routes = Router::new()
        .route("/users/:id/dashboard", get(handlers::get_dashboard))
        .route("/users/:id/registry", get(handlers::get_registry))
        .route("/audit", get(handlers::list_audit_log))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Cron triggers (shared secret)
    let cron_routes = Router::new()
        .route(
            "/cron/payment-reminders",
            get(handlers::trigger_payment_reminders).post(handlers::trigger_payment_reminders),
        )
        .route(
            "/cron/monthly-reports",
            get(handlers::trigger_monthly_reports).post(handlers::trigger_monthly_reports),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            cron_auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(user_routes)
        .merge(cron_routes);

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

fn build_cors(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        return cors;
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(origins)
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    email: EmailClient,
    settings: Settings,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }
    if config.cron_secret.is_none() {
        warn!(
            "⚠️  {} not set - cron trigger endpoints will reject all requests",
            CRON_SECRET_ENV
        );
    }

    // Start notification scheduler if configured
    if let Some(schedule) = NotifyScheduleConfig::from_env() {
        let dispatcher = NotificationDispatcher::new(db.clone(), email.clone(), settings.clone());
        start_notify_scheduler(db.clone(), dispatcher, settings.clone(), schedule);
    }

    let app = create_router(db, email, settings, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
