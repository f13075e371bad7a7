use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use outdial_core::domain::call::{CallId, CallSession, CallStatus, TranscriptEntry};
use outdial_core::domain::knowledge::CompanyKnowledge;
use outdial_core::domain::lead::{CompanyId, Lead, LeadId};
use outdial_core::domain::task::{ScheduledTask, TaskId, TaskStatus};

pub mod call_session;
pub mod knowledge;
pub mod lead;
pub mod scheduled_task;

pub use call_session::SqlCallSessionRepository;
pub use knowledge::SqlKnowledgeRepository;
pub use lead::SqlLeadRepository;
pub use scheduled_task::SqlScheduledTaskRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CallSessionRepository: Send + Sync {
    async fn find_by_call_id(&self, id: &CallId) -> Result<Option<CallSession>, RepositoryError>;

    /// Upserts the session row. Transcript entries are persisted separately
    /// through `append_transcript_entry` so they stay append-only.
    async fn save(&self, session: &CallSession) -> Result<(), RepositoryError>;

    async fn append_transcript_entry(
        &self,
        call_id: &CallId,
        entry: &TranscriptEntry,
    ) -> Result<(), RepositoryError>;

    /// Writes a status transition the lifecycle has already approved.
    /// Terminal statuses carry the end timestamp and reported duration.
    async fn apply_status(
        &self,
        call_id: &CallId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
        duration_secs: Option<u32>,
    ) -> Result<(), RepositoryError>;

    async fn record_turn(&self, call_id: &CallId) -> Result<(), RepositoryError>;

    /// Attaches the provider's recording reference. Arrives with the terminal
    /// status callback, after the session row already exists.
    async fn set_recording_ref(
        &self,
        call_id: &CallId,
        recording_ref: &str,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ScheduledTaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<ScheduledTask>, RepositoryError>;

    async fn save(&self, task: &ScheduledTask) -> Result<(), RepositoryError>;

    /// Compare-and-set claim: `pending` becomes `in_progress` exactly once.
    /// Returns false when another worker already holds the task.
    async fn claim(&self, id: &TaskId, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    async fn finish(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result_metadata: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Pending call tasks whose `scheduled_at` falls inside `now ±
    /// tolerance_secs`, oldest first.
    async fn due_calls(
        &self,
        now: DateTime<Utc>,
        tolerance_secs: u64,
    ) -> Result<Vec<ScheduledTask>, RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    async fn save(&self, lead: &Lead) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Assembles the full knowledge record for a company: base fields plus
    /// all products and services. Returns `None` for an unknown company.
    async fn knowledge_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<CompanyKnowledge>, RepositoryError>;
}
