use thiserror::Error;

/// Failure taxonomy for call placement and orchestration. Each variant
/// carries its own retry/surface contract:
///
/// - `Config` is fatal for the affected operation and never retried.
/// - `NotFound` and `InvalidNumber` surface to the caller, no retry.
/// - `Provider` surfaces to the dispatcher, which logs and moves on; no
///   automatic re-dial.
/// - `BackendTimeout`/`Backend` are always recovered locally with a fallback
///   utterance and never reach the telephony layer.
///
/// An unknown call id on a webhook is deliberately *not* here: it is an
/// accepted-and-discarded outcome, not an error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("configuration failure: {0}")]
    Config(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("destination cannot be normalized to a dialable number: `{0}`")]
    InvalidNumber(String),
    #[error("telephony provider failure: {0}")]
    Provider(String),
    #[error("generative backend timed out after {timeout_secs}s")]
    BackendTimeout { timeout_secs: u64 },
    #[error("generative backend failure: {0}")]
    Backend(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl OrchestratorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// True when the failure must never abort a live call and instead
    /// resolves to a fallback spoken line.
    pub fn is_recoverable_in_call(&self) -> bool {
        matches!(self, Self::BackendTimeout { .. } | Self::Backend(_))
    }
}
