use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::lead::{CompanyId, LeadId};
use crate::domain::task::TaskId;

/// Provider-assigned call identifier. The single external join key: every
/// webhook event routes to a session exclusively through this value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    InConversation,
    Completed,
    Failed,
    Busy,
    NoAnswer,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::Answered => "answered",
            Self::InConversation => "in_conversation",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Busy => "busy",
            Self::NoAnswer => "no_answer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "answered" => Some(Self::Answered),
            "in_conversation" => Some(Self::InConversation),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "busy" => Some(Self::Busy),
            "no_answer" => Some(Self::NoAnswer),
            _ => None,
        }
    }

    /// Terminal states are absorbing: once reached, later events for the same
    /// call are idempotent no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Busy | Self::NoAnswer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Lead,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Lead => "lead",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Some(Self::Agent),
            "lead" => Some(Self::Lead),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn now(speaker: Speaker, text: impl Into<String>) -> Self {
        Self { speaker, text: text.into(), timestamp: Utc::now() }
    }
}

/// One outbound call attempt and its evolving state. The transcript is
/// append-only; `status` only moves forward along the lifecycle graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: CallId,
    pub task_id: Option<TaskId>,
    pub lead_id: LeadId,
    pub lead_name: String,
    pub company_id: CompanyId,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<u32>,
    pub transcript: Vec<TranscriptEntry>,
    pub recording_ref: Option<String>,
    pub turn_count: u32,
}

impl CallSession {
    pub fn new(
        call_id: CallId,
        task_id: Option<TaskId>,
        lead_id: LeadId,
        lead_name: impl Into<String>,
        company_id: CompanyId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id,
            task_id,
            lead_id,
            lead_name: lead_name.into(),
            company_id,
            status: CallStatus::Initiated,
            started_at,
            ended_at: None,
            duration_secs: None,
            transcript: Vec::new(),
            recording_ref: None,
            turn_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CallStatus, Speaker};

    #[test]
    fn call_status_round_trips_from_storage_encoding() {
        let cases = [
            CallStatus::Initiated,
            CallStatus::Ringing,
            CallStatus::Answered,
            CallStatus::InConversation,
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Busy,
            CallStatus::NoAnswer,
        ];

        for status in cases {
            let decoded = CallStatus::parse(status.as_str());
            assert_eq!(decoded, Some(status));
        }
    }

    #[test]
    fn only_the_four_outcome_states_are_terminal() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::Busy.is_terminal());
        assert!(CallStatus::NoAnswer.is_terminal());

        assert!(!CallStatus::Initiated.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::Answered.is_terminal());
        assert!(!CallStatus::InConversation.is_terminal());
    }

    #[test]
    fn speaker_round_trips_from_storage_encoding() {
        assert_eq!(Speaker::parse("agent"), Some(Speaker::Agent));
        assert_eq!(Speaker::parse("LEAD"), Some(Speaker::Lead));
        assert_eq!(Speaker::parse("caller"), None);
    }
}
