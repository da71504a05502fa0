//! Action controllers for the subscription table: a "delete" action that
//! removes a row after a confirmed `DELETE`, and a "validate" action that
//! fills verification cells from a `GET` response. Both are instances of one
//! parameterized [`UiAction`]; the rendering surface stays behind the
//! [`RowView`], [`ConfirmPrompt`] and [`Notifier`] traits so the controllers
//! run against any table implementation.

use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

/// Prefix prepended to every failure notification, followed by the
/// server-supplied error text.
pub const ALERT_PREFIX: &str = "Oops... Something wrong is not right. ";

/// Fixed cell positions inside a subscription row, zero-indexed.
pub const VALIDITY_CELL: usize = 2;
pub const SCORE_CELL: usize = 3;
pub const SUGGESTION_CELL: usize = 4;

/// One row of the rendered table. `set_field` and `remove` mutate the
/// surface; `is_attached` reports whether the row is still part of it, so a
/// response that arrives after the row went away can be dropped.
pub trait RowView: Send + Sync {
    fn set_field(&self, index: usize, value: &str);
    fn remove(&self);
    fn is_attached(&self) -> bool;
}

/// Interactive yes/no prompt shown before destructive actions.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// Blocking user notification for request failures.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    AwaitingResponse,
}

/// The clickable element that starts an action: carries the target resource
/// URL, a label, and a single enablement flag. One trigger belongs to exactly
/// one row.
pub struct Trigger {
    url: String,
    label: Mutex<String>,
    enabled: AtomicBool,
    state: AtomicU8,
}

impl Trigger {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: Mutex::new(label.into()),
            enabled: AtomicBool::new(true),
            state: AtomicU8::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn label(&self) -> String {
        self.label
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TriggerState {
        if self.state.load(Ordering::SeqCst) == 1 {
            TriggerState::AwaitingResponse
        } else {
            TriggerState::Idle
        }
    }

    fn set_state(&self, state: TriggerState) {
        let raw = match state {
            TriggerState::Idle => 0,
            TriggerState::AwaitingResponse => 1,
        };
        self.state.store(raw, Ordering::SeqCst);
    }

    /// Disables the trigger and swaps in the transient label, returning the
    /// original so it can be restored on completion.
    fn begin_busy(&self, busy_label: &str) -> String {
        self.enabled.store(false, Ordering::SeqCst);
        let mut label = self.label.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *label, busy_label.to_string())
    }

    fn end_busy(&self, original_label: String) {
        let mut label = self.label.lock().unwrap_or_else(PoisonError::into_inner);
        *label = original_label;
        drop(label);
        self.enabled.store(true, Ordering::SeqCst);
    }
}

/// How one dispatch ended. Failures are already surfaced through the
/// [`Notifier`] by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The trigger was disabled (a request is already in flight); the click
    /// was dropped without any side effect.
    Ignored,
    /// The user declined the confirmation prompt; nothing was sent.
    Declined,
    Completed,
    Failed,
}

pub type SuccessHandler = Arc<dyn Fn(&dyn RowView, &[u8]) + Send + Sync>;

/// Configuration slot for one action kind: the HTTP method to issue, an
/// optional confirmation prompt, an optional in-flight label that locks the
/// trigger, and what to do to the row on success.
pub struct ActionConfig {
    pub method: Method,
    pub confirm: Option<String>,
    pub busy_label: Option<String>,
    pub on_success: SuccessHandler,
}

/// A single UI-action controller. Each dispatch captures its own trigger and
/// row; nothing about the "currently clicked" element is shared between
/// invocations.
pub struct UiAction {
    http: Client,
    config: ActionConfig,
    confirm: Arc<dyn ConfirmPrompt>,
    notify: Arc<dyn Notifier>,
}

impl UiAction {
    pub fn new(
        config: ActionConfig,
        confirm: Arc<dyn ConfirmPrompt>,
        notify: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_client(Client::new(), config, confirm, notify)
    }

    /// Uses a caller-supplied client, e.g. one carrying ambient auth headers.
    pub fn with_client(
        http: Client,
        config: ActionConfig,
        confirm: Arc<dyn ConfirmPrompt>,
        notify: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            http,
            config,
            confirm,
            notify,
        }
    }

    /// Runs the full interaction for one click: confirm, lock the trigger,
    /// issue the request, then apply the success handler or surface the
    /// server error. The trigger is restored whatever the outcome.
    pub async fn dispatch(&self, trigger: &Trigger, row: &dyn RowView) -> ActionOutcome {
        if !trigger.is_enabled() {
            debug!(url = trigger.url(), "trigger disabled; ignoring click");
            return ActionOutcome::Ignored;
        }

        if let Some(message) = &self.config.confirm {
            if !self.confirm.confirm(message) {
                debug!(url = trigger.url(), "action declined");
                return ActionOutcome::Declined;
            }
        }

        let original_label = self
            .config
            .busy_label
            .as_deref()
            .map(|busy| trigger.begin_busy(busy));

        trigger.set_state(TriggerState::AwaitingResponse);
        let result = self.request(trigger.url()).await;
        trigger.set_state(TriggerState::Idle);

        if let Some(label) = original_label {
            trigger.end_busy(label);
        }

        match result {
            Ok(body) => {
                if row.is_attached() {
                    (self.config.on_success)(row, &body);
                } else {
                    debug!(url = trigger.url(), "row gone before response; dropping");
                }
                ActionOutcome::Completed
            }
            Err(message) => {
                warn!(url = trigger.url(), %message, "action request failed");
                self.notify.alert(&format!("{ALERT_PREFIX}{message}"));
                ActionOutcome::Failed
            }
        }
    }

    async fn request(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .request(self.config.method.clone(), url)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let status = response.status();
        let body = response.bytes().await.map(|bytes| bytes.to_vec());
        if status.is_success() {
            return Ok(body.unwrap_or_default());
        }
        Err(server_error_text(status, &body.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

/// Pulls the human-readable error text out of a failure response: the
/// `message` field of a JSON error body, else the raw body text, else the
/// status line.
fn server_error_text(status: StatusCode, body: &[u8]) -> String {
    if let Ok(err) = serde_json::from_slice::<WireError>(body) {
        return err.message;
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

/// Validate response body: every field optional, unknown fields ignored. A
/// key that is absent leaves the matching cell untouched.
#[derive(Debug, Default, Deserialize)]
struct ValidationPayload {
    #[serde(default)]
    format_valid: Option<bool>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    did_you_mean: Option<String>,
}

fn apply_validation_fields(row: &dyn RowView, body: &[u8]) {
    // Malformed bodies count as "no verdicts", never as an error.
    let payload: ValidationPayload = serde_json::from_slice(body).unwrap_or_default();

    if let Some(valid) = payload.format_valid {
        row.set_field(VALIDITY_CELL, &valid.to_string());
    }
    if let Some(score) = payload.score {
        row.set_field(SCORE_CELL, &format_score(score));
    }
    if let Some(suggestion) = payload.did_you_mean.filter(|s| !s.is_empty()) {
        row.set_field(SUGGESTION_CELL, &suggestion);
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < i64::MAX as f64 {
        format!("{}", score as i64)
    } else {
        score.to_string()
    }
}

fn delete_config() -> ActionConfig {
    ActionConfig {
        method: Method::DELETE,
        confirm: Some("Are you sure?".to_string()),
        busy_label: None,
        on_success: Arc::new(|row, _body| row.remove()),
    }
}

fn validate_config() -> ActionConfig {
    ActionConfig {
        method: Method::GET,
        confirm: None,
        busy_label: Some("Checking...".to_string()),
        on_success: Arc::new(apply_validation_fields),
    }
}

pub fn delete_action(confirm: Arc<dyn ConfirmPrompt>, notify: Arc<dyn Notifier>) -> UiAction {
    UiAction::new(delete_config(), confirm, notify)
}

pub fn validate_action(confirm: Arc<dyn ConfirmPrompt>, notify: Arc<dyn Notifier>) -> UiAction {
    UiAction::new(validate_config(), confirm, notify)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Validate,
}

/// Both controllers for a bound page, initialized together.
pub struct ActionSet {
    delete: UiAction,
    validate: UiAction,
}

impl ActionSet {
    pub fn new(confirm: Arc<dyn ConfirmPrompt>, notify: Arc<dyn Notifier>) -> Self {
        Self {
            delete: delete_action(Arc::clone(&confirm), Arc::clone(&notify)),
            validate: validate_action(confirm, notify),
        }
    }

    /// Builds both controllers on top of a shared HTTP client, e.g. one that
    /// carries basic-auth credentials for the management surface.
    pub fn with_client(
        http: Client,
        confirm: Arc<dyn ConfirmPrompt>,
        notify: Arc<dyn Notifier>,
    ) -> Self {
        let delete = UiAction::with_client(
            http.clone(),
            delete_config(),
            Arc::clone(&confirm),
            Arc::clone(&notify),
        );
        let validate = UiAction::with_client(http, validate_config(), confirm, notify);
        Self { delete, validate }
    }

    pub async fn click(
        &self,
        kind: ActionKind,
        trigger: &Trigger,
        row: &dyn RowView,
    ) -> ActionOutcome {
        match kind {
            ActionKind::Delete => self.delete.dispatch(trigger, row).await,
            ActionKind::Validate => self.validate.dispatch(trigger, row).await,
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
