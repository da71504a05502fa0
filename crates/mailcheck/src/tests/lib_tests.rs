use super::*;
use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use std::collections::HashMap;
use tokio::net::TcpListener;

async fn spawn_checker_stub(
    response: serde_json::Value,
    status: StatusCode,
) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route(
        "/api/check",
        get(move |Query(_params): Query<HashMap<String, String>>| {
            let response = response.clone();
            async move { (status, Json(response)) }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/api/check"))
}

fn config(base_url: String) -> CheckerConfig {
    CheckerConfig {
        base_url,
        access_key: "test-key".to_string(),
    }
}

#[test]
fn endpoint_embeds_access_key_and_email_parameter() {
    let endpoint = config("http://apilayer.net/api/check".to_string()).endpoint();
    assert_eq!(
        endpoint,
        "http://apilayer.net/api/check?access_key=test-key&smtp=1&email="
    );
}

#[tokio::test]
async fn parses_full_verdict() {
    let base_url = spawn_checker_stub(
        serde_json::json!({
            "email": "alice@example.com",
            "format_valid": true,
            "score": 0.96,
            "did_you_mean": "alice@example.org"
        }),
        StatusCode::OK,
    )
    .await
    .expect("stub");

    let checker = ApiLayerChecker::new(&config(base_url));
    let report = checker.validate("alice@example.com").await.expect("report");
    assert_eq!(report.email, "alice@example.com");
    assert_eq!(report.format_valid, Some(true));
    assert_eq!(report.score, Some(0.96));
    assert_eq!(report.did_you_mean.as_deref(), Some("alice@example.org"));
    assert!(report.checked_at.is_some());
}

#[tokio::test]
async fn empty_suggestion_is_treated_as_absent() {
    let base_url = spawn_checker_stub(
        serde_json::json!({
            "email": "bob@example.com",
            "format_valid": true,
            "score": 0.5,
            "did_you_mean": ""
        }),
        StatusCode::OK,
    )
    .await
    .expect("stub");

    let checker = ApiLayerChecker::new(&config(base_url));
    let report = checker.validate("bob@example.com").await.expect("report");
    assert_eq!(report.did_you_mean, None);
}

#[tokio::test]
async fn upstream_error_status_fails_the_check() {
    let base_url = spawn_checker_stub(
        serde_json::json!({ "error": "invalid access key" }),
        StatusCode::UNAUTHORIZED,
    )
    .await
    .expect("stub");

    let checker = ApiLayerChecker::new(&config(base_url));
    let err = checker
        .validate("alice@example.com")
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("email verifier failed"));
}

#[tokio::test]
async fn missing_checker_always_fails_with_configuration_hint() {
    let err = MissingMailChecker
        .validate("alice@example.com")
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("MAIL_CHECKER_ACCESS_KEY"));
}
