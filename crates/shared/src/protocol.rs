use serde::{Deserialize, Serialize};

/// Body of `POST /subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    pub name: String,
}

/// Result of a full validation sweep over every stored subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidateAllResponse {
    pub checked: u32,
}
