use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use axum::{body, body::Body, http::Request};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use tower::ServiceExt;

const TEST_USER: &str = "admin";
const TEST_PASSWORD: &str = "secret";

struct StubChecker {
    format_valid: Option<bool>,
    score: Option<f64>,
    did_you_mean: Option<String>,
    fail_with: Option<String>,
}

#[async_trait]
impl MailChecker for StubChecker {
    async fn validate(&self, email: &str) -> anyhow::Result<VerificationReport> {
        if let Some(err) = &self.fail_with {
            return Err(anyhow!(err.clone()));
        }
        Ok(VerificationReport {
            email: email.to_string(),
            format_valid: self.format_valid,
            score: self.score,
            did_you_mean: self.did_you_mean.clone(),
            checked_at: Some(Utc::now()),
        })
    }
}

async fn test_app(checker: StubChecker) -> Router {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage,
        checker: Arc::new(checker),
    };
    let auth = Arc::new(AuthSettings {
        username: TEST_USER.to_string(),
        password: TEST_PASSWORD.to_string(),
    });
    build_router(Arc::new(AppState { api }), auth)
}

fn ok_checker() -> StubChecker {
    StubChecker {
        format_valid: Some(true),
        score: Some(0.87),
        did_you_mean: None,
        fail_with: None,
    }
}

fn authorization() -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{TEST_USER}:{TEST_PASSWORD}"))
    )
}

async fn subscribe_via_router(app: &Router, email: &str, name: &str) {
    let request = Request::post("/subscribe")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "email": email, "name": name }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app(ok_checker()).await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn subscribe_then_authorized_list_shows_subscription() {
    let app = test_app(ok_checker()).await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;

    let request = Request::get("/subscriptions")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let subscriptions: Vec<Subscription> = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].email, "alice@example.com");
}

#[tokio::test]
async fn subscribe_rejects_malformed_email() {
    let app = test_app(ok_checker()).await;
    let request = Request::post("/subscribe")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "email": "not-an-email", "name": "Alice" }).to_string(),
        ))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let err: ApiError = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(err.message, "Invalid e-mail");
}

#[tokio::test]
async fn management_routes_require_basic_auth() {
    let app = test_app(ok_checker()).await;

    let anonymous = Request::get("/subscriptions")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(anonymous).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let err: ApiError = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(err.message, "You don't have access to this page.");

    let wrong = Request::delete("/subscriptions/alice@example.com")
        .header(
            "authorization",
            format!("Basic {}", STANDARD.encode("admin:wrong")),
        )
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(wrong).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_removes_subscription_and_missing_delete_is_not_found() {
    let app = test_app(ok_checker()).await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;

    let request = Request::delete("/subscriptions/alice@example.com")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let again = Request::delete("/subscriptions/alice@example.com")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(again).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let err: ApiError = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(
        err.message,
        "could not find a subscription for the given email"
    );
}

#[tokio::test]
async fn validate_returns_the_recorded_report() {
    let app = test_app(ok_checker()).await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;

    let request = Request::get("/subscriptions/alice@example.com/validate")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let report: VerificationReport = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(report.format_valid, Some(true));
    assert_eq!(report.score, Some(0.87));

    let list = Request::get("/subscriptions")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(list).await.expect("response");
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let subscriptions: Vec<Subscription> = serde_json::from_slice(&bytes).expect("json");
    assert!(subscriptions[0].verification.is_some());
}

#[tokio::test]
async fn validate_response_omits_absent_report_fields() {
    let app = test_app(StubChecker {
        format_valid: Some(false),
        score: None,
        did_you_mean: None,
        fail_with: None,
    })
    .await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;

    let request = Request::get("/subscriptions/alice@example.com/validate")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let raw: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(raw.get("format_valid"), Some(&serde_json::json!(false)));
    assert!(raw.get("score").is_none());
    assert!(raw.get("did_you_mean").is_none());
}

#[tokio::test]
async fn validate_failure_maps_to_bad_gateway_with_server_message() {
    let app = test_app(StubChecker {
        format_valid: None,
        score: None,
        did_you_mean: None,
        fail_with: Some("Timeout".to_string()),
    })
    .await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;

    let request = Request::get("/subscriptions/alice@example.com/validate")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let err: ApiError = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(err.message, "Timeout");
}

#[tokio::test]
async fn validate_all_sweeps_every_subscription() {
    let app = test_app(ok_checker()).await;
    subscribe_via_router(&app, "alice@example.com", "Alice").await;
    subscribe_via_router(&app, "bob@example.com", "Bob").await;

    let request = Request::get("/subscriptions/validate")
        .header("authorization", authorization())
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let outcome: ValidateAllResponse = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(outcome.checked, 2);
}
