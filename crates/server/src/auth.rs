use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::error::{ApiError, ErrorCode};

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub username: String,
    pub password: String,
}

/// HTTP basic auth gate for the management surface.
pub async fn require_basic_auth(
    State(auth): State<Arc<AuthSettings>>,
    request: Request,
    next: Next,
) -> Response {
    if credentials_match(&auth, request.headers().get(header::AUTHORIZATION)) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"subscriptions\""),
        )],
        Json(ApiError::new(
            ErrorCode::Unauthorized,
            "You don't have access to this page.",
        )),
    )
        .into_response()
}

fn credentials_match(auth: &AuthSettings, header: Option<&HeaderValue>) -> bool {
    let Some(value) = header.and_then(|value| value.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(text) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = text.split_once(':') else {
        return false;
    };
    username == auth.username && password == auth.password
}
