use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use outdial_core::config::TelephonyConfig;
use outdial_core::domain::call::CallId;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("destination cannot be normalized to a dialable number: `{0}`")]
    InvalidNumber(String),
    #[error("telephony provider failure: {0}")]
    Provider(String),
}

/// Everything the provider needs to start an outbound call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallPlacement {
    pub to: String,
    pub from: String,
    /// Fetched by the provider once the call is answered.
    pub answer_url: String,
    /// Receives lifecycle status events.
    pub status_callback_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedCall {
    pub call_id: CallId,
}

#[async_trait]
pub trait TelephonyClient: Send + Sync {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, PlacementError>;
}

/// Normalizes a raw phone number to `+` followed by digits. Separators are
/// dropped; bare 10-digit numbers get the NANP country code; anything else
/// that is not already plus-prefixed must carry its own country code.
pub fn normalize_number(raw: &str) -> Result<String, PlacementError> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let mut digits = String::new();

    for ch in trimmed.chars().skip(usize::from(has_plus)) {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(PlacementError::InvalidNumber(raw.to_string())),
        }
    }

    let normalized = if has_plus {
        digits.clone()
    } else if digits.len() == 10 {
        format!("1{digits}")
    } else if digits.len() == 11 && digits.starts_with('1') {
        digits.clone()
    } else {
        return Err(PlacementError::InvalidNumber(raw.to_string()));
    };

    if normalized.len() < 8 || normalized.len() > 15 {
        return Err(PlacementError::InvalidNumber(raw.to_string()));
    }

    Ok(format!("+{normalized}"))
}

/// HTTP client against the provider's REST calls endpoint.
pub struct HttpTelephonyClient {
    http: reqwest::Client,
    api_base_url: String,
    account_sid: String,
    auth_token: SecretString,
}

impl HttpTelephonyClient {
    /// Returns `None` when credentials are absent (no-dial mode).
    pub fn from_config(config: &TelephonyConfig) -> Option<Self> {
        let account_sid = config.account_sid.clone()?;
        let auth_token = config.auth_token.clone()?;

        Some(Self {
            http: reqwest::Client::new(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
        })
    }
}

#[async_trait]
impl TelephonyClient for HttpTelephonyClient {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, PlacementError> {
        let url = format!("{}/Accounts/{}/Calls.json", self.api_base_url, self.account_sid);
        let form = [
            ("To", placement.to.as_str()),
            ("From", placement.from.as_str()),
            ("Url", placement.answer_url.as_str()),
            ("StatusCallback", placement.status_callback_url.as_str()),
            ("StatusCallbackEvent", "initiated ringing answered completed"),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|error| PlacementError::Provider(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlacementError::Provider(format!("provider returned {status}: {body}")));
        }

        let created: CreatedCall = response
            .json()
            .await
            .map_err(|error| PlacementError::Provider(format!("unparseable response: {error}")))?;

        tracing::info!(
            event_name = "telephony.call_placed",
            call_id = %created.sid,
            to = %placement.to,
            "outbound call placed"
        );

        Ok(PlacedCall { call_id: CallId(created.sid) })
    }
}

#[derive(Deserialize)]
struct CreatedCall {
    sid: String,
}

/// In-process client for tests and no-dial mode: placements succeed with
/// generated call ids (or fail with scripted errors) and record what was
/// requested.
#[derive(Default)]
pub struct StaticTelephonyClient {
    placements: Mutex<Vec<CallPlacement>>,
    scripted_failures: Mutex<Vec<String>>,
}

impl StaticTelephonyClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `place_call` returns a provider failure with this message.
    pub fn fail_next(&self, message: impl Into<String>) {
        match self.scripted_failures.lock() {
            Ok(mut failures) => failures.push(message.into()),
            Err(poisoned) => poisoned.into_inner().push(message.into()),
        }
    }

    pub fn placements(&self) -> Vec<CallPlacement> {
        match self.placements.lock() {
            Ok(placements) => placements.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl TelephonyClient for StaticTelephonyClient {
    async fn place_call(&self, placement: &CallPlacement) -> Result<PlacedCall, PlacementError> {
        let failure = match self.scripted_failures.lock() {
            Ok(mut failures) => failures.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };
        if let Some(message) = failure {
            return Err(PlacementError::Provider(message));
        }

        match self.placements.lock() {
            Ok(mut placements) => placements.push(placement.clone()),
            Err(poisoned) => poisoned.into_inner().push(placement.clone()),
        }

        Ok(PlacedCall { call_id: CallId(format!("CA-local-{}", Uuid::new_v4())) })
    }
}
