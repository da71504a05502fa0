use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use mailcheck::{ApiLayerChecker, CheckerConfig, MailChecker, MissingMailChecker};
use server_api::{
    list_subscriptions, remove_subscription, subscribe, validate_all, validate_subscription,
    ApiContext,
};
use shared::{
    domain::{Subscription, VerificationReport},
    error::{ApiError, ErrorCode},
    protocol::{SubscribeRequest, ValidateAllResponse},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

mod auth;
mod config;

use auth::AuthSettings;
use config::{load_settings, prepare_database_url};

const MAX_SUBSCRIBE_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|err| {
        error!(
            %database_url,
            %err,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        err
    })?;

    let checker: Arc<dyn MailChecker> = match &settings.mail_checker_access_key {
        Some(access_key) => Arc::new(ApiLayerChecker::new(&CheckerConfig {
            base_url: settings.mail_checker_url.clone(),
            access_key: access_key.clone(),
        })),
        None => {
            warn!("MAIL_CHECKER_ACCESS_KEY is not set; validation requests will fail");
            Arc::new(MissingMailChecker)
        }
    };

    let api = ApiContext { storage, checker };
    let auth = Arc::new(AuthSettings {
        username: settings.auth_username,
        password: settings.auth_password,
    });
    let app = build_router(Arc::new(AppState { api }), auth);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, auth: Arc<AuthSettings>) -> Router {
    let management = Router::new()
        .route("/subscriptions", get(http_list_subscriptions))
        .route("/subscriptions/validate", get(http_validate_all))
        .route(
            "/subscriptions/:email/validate",
            get(http_validate_subscription),
        )
        .route("/subscriptions/:email", delete(http_remove_subscription))
        .layer(middleware::from_fn_with_state(
            auth,
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/subscribe",
            post(http_subscribe).layer(RequestBodyLimitLayer::new(MAX_SUBSCRIBE_BODY_BYTES)),
        )
        .merge(management)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Subscription>), (StatusCode, Json<ApiError>)> {
    let subscription = subscribe(&state.api, &req.email, &req.name)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn http_list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Subscription>>, (StatusCode, Json<ApiError>)> {
    let subscriptions = list_subscriptions(&state.api).await.map_err(error_response)?;
    Ok(Json(subscriptions))
}

async fn http_validate_subscription(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<VerificationReport>, (StatusCode, Json<ApiError>)> {
    let report = validate_subscription(&state.api, &email)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

async fn http_validate_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ValidateAllResponse>, (StatusCode, Json<ApiError>)> {
    let outcome = validate_all(&state.api).await.map_err(error_response)?;
    Ok(Json(outcome))
}

async fn http_remove_subscription(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    remove_subscription(&state.api, &email)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
