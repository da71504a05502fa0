use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verdict produced by the external mail checker for a single address.
///
/// Every field except `email` is optional: the checker omits keys it has no
/// verdict for, and consumers must leave the corresponding display state
/// untouched rather than clearing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did_you_mean: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl VerificationReport {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            format_valid: None,
            score: None,
            did_you_mean: None,
            checked_at: None,
        }
    }
}

/// A mailing-list subscription, keyed by email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

impl Subscription {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            verification: None,
        }
    }
}
