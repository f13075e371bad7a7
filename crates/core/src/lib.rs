pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod knowledge;
pub mod lifecycle;

pub use chrono;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::call::{CallId, CallSession, CallStatus, Speaker, TranscriptEntry};
pub use domain::knowledge::{CompanyKnowledge, Product, Service};
pub use domain::lead::{CompanyId, Lead, LeadId};
pub use domain::task::{ScheduledTask, TaskId, TaskStatus, TaskType};
pub use errors::OrchestratorError;
pub use knowledge::build_context;
pub use lifecycle::{apply, TransitionOutcome};
