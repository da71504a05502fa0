use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use shared::domain::VerificationReport;

/// Where the external checker lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub base_url: String,
    pub access_key: String,
}

impl CheckerConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}?access_key={}&smtp=1&email=",
            self.base_url.trim_end_matches('/'),
            self.access_key
        )
    }
}

#[async_trait]
pub trait MailChecker: Send + Sync {
    async fn validate(&self, email: &str) -> Result<VerificationReport>;
}

/// apilayer-style checker: `GET {endpoint}{email}` returning a JSON object
/// with `email`, `format_valid`, `score` and `did_you_mean`.
pub struct ApiLayerChecker {
    http: Client,
    endpoint: String,
}

impl ApiLayerChecker {
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            http: Client::new(),
            endpoint: config.endpoint(),
        }
    }
}

#[async_trait]
impl MailChecker for ApiLayerChecker {
    async fn validate(&self, email: &str) -> Result<VerificationReport> {
        debug!(email, "validating address against external checker");
        let response = self
            .http
            .get(format!("{}{email}", self.endpoint))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("request to email verifier failed"));
        }

        let mut report: VerificationReport = response.json().await?;
        // The upstream API answers "no suggestion" with an empty string.
        if report
            .did_you_mean
            .as_deref()
            .is_some_and(|suggestion| suggestion.is_empty())
        {
            report.did_you_mean = None;
        }
        if report.email.is_empty() {
            report.email = email.to_string();
        }
        report.checked_at = Some(Utc::now());
        Ok(report)
    }
}

/// Null object used when no access key is configured.
pub struct MissingMailChecker;

#[async_trait]
impl MailChecker for MissingMailChecker {
    async fn validate(&self, email: &str) -> Result<VerificationReport> {
        Err(anyhow!(
            "mail checker is not configured; set MAIL_CHECKER_ACCESS_KEY to validate {email}"
        ))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
