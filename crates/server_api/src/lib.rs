use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use mailcheck::MailChecker;
use regex::Regex;
use shared::{
    domain::{Subscription, VerificationReport},
    error::{ApiError, ErrorCode},
    protocol::ValidateAllResponse,
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub checker: Arc<dyn MailChecker>,
}

const VALIDATE_ALL_TIMEOUT: Duration = Duration::from_secs(5);

// WHATWG email grammar, same check the subscribe form performs server-side.
fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex")
    })
}

pub async fn list_subscriptions(ctx: &ApiContext) -> Result<Vec<Subscription>, ApiError> {
    ctx.storage.list_subscriptions().await.map_err(internal)
}

pub async fn subscribe(ctx: &ApiContext, email: &str, name: &str) -> Result<Subscription, ApiError> {
    if email.is_empty() || name.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "Invalid name or e-mail"));
    }
    if !email_regex().is_match(email) {
        return Err(ApiError::new(ErrorCode::Validation, "Invalid e-mail"));
    }

    let subscription = Subscription::new(email, name);
    ctx.storage
        .upsert_subscription(&subscription)
        .await
        .map_err(internal)?;
    info!(email, "subscription stored");
    Ok(subscription)
}

pub async fn remove_subscription(ctx: &ApiContext, email: &str) -> Result<(), ApiError> {
    let removed = ctx
        .storage
        .remove_subscription(email)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(not_found());
    }
    info!(email, "subscription removed");
    Ok(())
}

/// Runs the external check for one subscribed address and persists the verdict.
pub async fn validate_subscription(
    ctx: &ApiContext,
    email: &str,
) -> Result<VerificationReport, ApiError> {
    let subscription = ctx
        .storage
        .find_subscription(email)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    let report = ctx
        .checker
        .validate(&subscription.email)
        .await
        .map_err(|err| ApiError::new(ErrorCode::Upstream, err.to_string()))?;

    ctx.storage
        .record_verification(&subscription.email, &report)
        .await
        .map_err(internal)?;
    info!(email, "verification recorded");
    Ok(report)
}

/// Checks every stored subscription concurrently. The first failure wins, and
/// the whole sweep is bounded; addresses already checked keep their verdicts
/// either way.
pub async fn validate_all(ctx: &ApiContext) -> Result<ValidateAllResponse, ApiError> {
    let subscriptions = ctx.storage.list_subscriptions().await.map_err(internal)?;
    let checked = subscriptions.len() as u32;

    let sweep = futures::future::try_join_all(
        subscriptions
            .iter()
            .map(|subscription| async move { validate_subscription(ctx, &subscription.email).await }),
    );

    match tokio::time::timeout(VALIDATE_ALL_TIMEOUT, sweep).await {
        Ok(Ok(_)) => Ok(ValidateAllResponse { checked }),
        Ok(Err(err)) => Err(ApiError::new(
            err.code,
            format!(
                "not all validations were correctly performed: {}",
                err.message
            ),
        )),
        Err(_) => Err(ApiError::new(
            ErrorCode::Upstream,
            format!(
                "validation is still running after {}s; refresh later to see the results",
                VALIDATE_ALL_TIMEOUT.as_secs()
            ),
        )),
    }
}

fn not_found() -> ApiError {
    ApiError::new(
        ErrorCode::NotFound,
        "could not find a subscription for the given email",
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
