use serde::Deserialize;

use outdial_core::domain::call::CallStatus;

/// Status webhook payload. The provider posts these as form bodies with
/// PascalCase field names; delivery order is not guaranteed.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<u32>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// Speech-gather webhook payload: one transcribed lead utterance.
#[derive(Clone, Debug, Deserialize)]
pub struct SpeechCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f64>,
}

/// Maps the provider's status vocabulary onto the call lifecycle. Returns
/// `None` for vocabulary we have no transition for (`queued` arrives before
/// the call has left our `initiated` state and carries no new information).
pub fn map_provider_status(provider_status: &str) -> Option<CallStatus> {
    match provider_status.trim().to_ascii_lowercase().as_str() {
        "initiated" => Some(CallStatus::Initiated),
        "ringing" => Some(CallStatus::Ringing),
        "in-progress" | "answered" => Some(CallStatus::Answered),
        "completed" => Some(CallStatus::Completed),
        "busy" => Some(CallStatus::Busy),
        "no-answer" => Some(CallStatus::NoAnswer),
        "failed" | "canceled" => Some(CallStatus::Failed),
        _ => None,
    }
}
