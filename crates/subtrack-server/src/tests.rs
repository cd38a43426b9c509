//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use subtrack_core::db::Database;
use subtrack_core::models::{BillingCycle, NewSubscription};
use subtrack_core::notify::MockEmailBackend;
use tower::ServiceExt;

const CRON_SECRET: &str = "cron-secret-for-tests";
const API_KEY: &str = "api-key-for-tests";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn test_config() -> ServerConfig {
    ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
        api_keys: vec![],
        cron_secret: Some(CRON_SECRET.to_string()),
    }
}

fn setup_test_app_with(config: ServerConfig) -> (Router, Database, MockEmailBackend) {
    let db = Database::in_memory().unwrap();
    let mock = MockEmailBackend::new();
    let app = create_router(
        db.clone(),
        EmailClient::Mock(mock.clone()),
        Settings::default(),
        config,
    );
    (app, db, mock)
}

fn setup_test_app() -> (Router, Database, MockEmailBackend) {
    setup_test_app_with(test_config())
}

/// Alex with Netflix (due 2024-03-04) and Spotify (due 2024-03-20)
fn seed(db: &Database) -> i64 {
    let user = db.create_user("alex@example.com", Some("Alex")).unwrap();
    for (name, price, next) in [
        ("Netflix", "19.99", d(2024, 3, 4)),
        ("Spotify", "9.99", d(2024, 3, 20)),
    ] {
        db.create_subscription(
            user,
            &NewSubscription {
                name: name.to_string(),
                price: price.to_string(),
                billing_cycle: BillingCycle::Monthly,
                start_date: d(2023, 1, 1),
                next_payment: Some(next),
                category: Some("Entertainment".to_string()),
            },
        )
        .unwrap();
    }
    user
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn cron_request(method: &str, uri: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(secret) = secret {
        builder = builder.header("authorization", format!("Bearer {}", secret));
    }
    builder.body(Body::empty()).unwrap()
}

// ========== Cron Trigger Tests ==========

#[tokio::test]
async fn test_cron_without_secret_rejected() {
    let (app, db, mock) = setup_test_app();
    seed(&db);

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/payment-reminders?date=2024-03-01",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_cron_with_wrong_secret_rejected() {
    let (app, db, mock) = setup_test_app();
    let user = seed(&db);

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/payment-reminders?date=2024-03-01",
            Some("not-the-secret"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(mock.sent().is_empty());

    // Rejected before any processing: nothing was advanced or watermarked
    let netflix = &db.list_subscriptions(user).unwrap()[0];
    assert!(!db.reminder_sent(netflix.id, d(2024, 3, 1)).unwrap());
}

#[tokio::test]
async fn test_cron_rejected_when_secret_not_configured() {
    let (app, db, mock) = setup_test_app_with(ServerConfig {
        cron_secret: None,
        ..test_config()
    });
    seed(&db);

    let response = app
        .oneshot(cron_request(
            "GET",
            "/api/cron/payment-reminders",
            Some(CRON_SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn test_cron_payment_reminders() {
    let (app, db, mock) = setup_test_app();
    seed(&db);

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/payment-reminders?date=2024-03-01",
            Some(CRON_SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"]["total"], 1);
    assert_eq!(json["summary"]["emailsSent"], 1);
    assert_eq!(json["summary"]["errors"], 0);

    let sent = mock.sent_to("alex@example.com");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("Netflix"));
}

#[tokio::test]
async fn test_cron_accepts_get() {
    let (app, db, _mock) = setup_test_app();
    seed(&db);

    let response = app
        .oneshot(cron_request(
            "GET",
            "/api/cron/payment-reminders?date=2024-03-01",
            Some(CRON_SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["summary"]["emailsSent"], 1);
}

#[tokio::test]
async fn test_cron_repeat_trigger_same_day() {
    let (app, db, mock) = setup_test_app();
    seed(&db);

    for expected in [1, 0] {
        let response = app
            .clone()
            .oneshot(cron_request(
                "POST",
                "/api/cron/payment-reminders?date=2024-03-01",
                Some(CRON_SECRET),
            ))
            .await
            .unwrap();
        let json = get_body_json(response).await;
        assert_eq!(json["summary"]["emailsSent"], expected);
    }
    assert_eq!(mock.sent().len(), 1);
}

#[tokio::test]
async fn test_cron_monthly_reports() {
    let (app, db, mock) = setup_test_app();
    let user = seed(&db);

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/monthly-reports?date=2024-03-01",
            Some(CRON_SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"]["emailsSent"], 1);

    let sent = mock.sent();
    assert_eq!(sent[0].subject, "Your February 2024 subscription report");
    assert!(db.get_report_record(user, "2024-02").unwrap().is_some());
}

#[tokio::test]
async fn test_cron_invalid_date() {
    let (app, _db, _mock) = setup_test_app();

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/monthly-reports?date=03/01/2024",
            Some(CRON_SECRET),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("YYYY-MM-DD"));
}

#[tokio::test]
async fn test_cron_audit_logged() {
    let (app, db, _mock) = setup_test_app();
    seed(&db);

    app.oneshot(cron_request(
        "POST",
        "/api/cron/payment-reminders?date=2024-03-01",
        Some(CRON_SECRET),
    ))
    .await
    .unwrap();

    let entries = db.list_audit_log(10).unwrap();
    assert!(entries
        .iter()
        .any(|e| e.actor == "cron" && e.action == "payment_reminders"));
}

// ========== Dashboard & Registry Tests ==========

#[tokio::test]
async fn test_dashboard() {
    let (app, db, _mock) = setup_test_app();
    let user = seed(&db);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/dashboard?date=2024-03-01", user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["userId"], user);
    assert_eq!(json["date"], "2024-03-01");
    assert_eq!(json["totalMonthly"], 29.98);

    let categories = json["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["name"], "Entertainment");
    assert_eq!(categories[0]["percentage"], 100.0);

    let top = json["topSubscriptions"].as_array().unwrap();
    assert_eq!(top[0]["name"], "Netflix");

    let upcoming = json["upcomingRenewals"].as_array().unwrap();
    assert_eq!(upcoming.len(), 2);
    assert_eq!(upcoming[0]["name"], "Netflix");
    assert_eq!(upcoming[0]["daysUntil"], 3);
}

#[tokio::test]
async fn test_dashboard_unknown_user() {
    let (app, _db, _mock) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/users/999/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_registry() {
    let (app, db, _mock) = setup_test_app();
    let user = seed(&db);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/registry", user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["email"], "alex@example.com");
    assert_eq!(json["subscriptions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_registry_never_shows_past_payments() {
    let (app, db, _mock) = setup_test_app();
    // Seeded payments are in March 2024, long before the real today
    let user = seed(&db);
    let today = chrono::Utc::now().date_naive();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/registry", user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    for sub in json["subscriptions"].as_array().unwrap() {
        let next = NaiveDate::parse_from_str(sub["next_payment"].as_str().unwrap(), "%Y-%m-%d").unwrap();
        assert!(next > today, "{} is not after {}", next, today);
    }
}

#[tokio::test]
async fn test_registry_rebuilt_when_missing() {
    let (app, db, _mock) = setup_test_app();
    let user = seed(&db);
    db.clear_registries().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/registry", user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(db.get_registry(user).unwrap().is_some());
}

// ========== Auth Tests ==========

#[tokio::test]
async fn test_user_routes_require_api_key() {
    let (app, db, _mock) = setup_test_app_with(ServerConfig {
        require_auth: true,
        api_keys: vec![API_KEY.to_string()],
        ..test_config()
    });
    let user = seed(&db);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/dashboard", user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/dashboard", user))
                .header("authorization", format!("Bearer {}", API_KEY))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cron_secret_is_not_an_api_key() {
    let (app, db, _mock) = setup_test_app_with(ServerConfig {
        require_auth: true,
        api_keys: vec![API_KEY.to_string()],
        ..test_config()
    });
    let user = seed(&db);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}/registry", user))
                .header("authorization", format!("Bearer {}", CRON_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(cron_request(
            "POST",
            "/api/cron/payment-reminders?date=2024-03-01",
            Some(API_KEY),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _db, _mock) = setup_test_app_with(ServerConfig {
        require_auth: true,
        api_keys: vec![API_KEY.to_string()],
        ..test_config()
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["email_backend"], "mock");
}

#[tokio::test]
async fn test_security_headers() {
    let (app, _db, _mock) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn test_audit_log_endpoint() {
    let (app, db, _mock) = setup_test_app();
    let user = seed(&db);
    db.log_audit("cli", "create", Some("user"), Some(user), None)
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/audit?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["actor"] == "cli"));
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _db, _mock) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["alpha".to_string(), "beta".to_string()];
    assert!(validate_api_key("alpha", &keys));
    assert!(validate_api_key("beta", &keys));
    assert!(!validate_api_key("alph", &keys));
    assert!(!validate_api_key("", &keys));
    assert!(!validate_api_key("alpha", &[]));
}

#[test]
fn test_parse_api_keys() {
    assert_eq!(parse_api_keys(" a, b ,,c"), vec!["a", "b", "c"]);
    assert!(parse_api_keys("").is_empty());
}
