use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use outdial_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use outdial_core::domain::call::{CallId, CallStatus};
use outdial_core::domain::task::TaskStatus;
use outdial_core::lifecycle::{self, TransitionOutcome};
use outdial_core::OrchestratorError;
use outdial_db::repositories::{CallSessionRepository, RepositoryError, ScheduledTaskRepository};

/// Result of pushing one status event through the lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied { from: CallStatus, to: CallStatus, out_of_order: bool },
    /// No session for this call id. Accepted and discarded; webhooks still
    /// acknowledge with success so the provider stops retrying.
    UnknownCall,
    Ignored,
}

/// Serializes status events per call id and applies the lifecycle verdict to
/// storage. Provider webhooks arrive concurrently and out of order; the
/// per-call critical section here is what makes the first terminal event win
/// deterministically.
pub struct StatusReconciler {
    sessions: Arc<dyn CallSessionRepository>,
    tasks: Arc<dyn ScheduledTaskRepository>,
    audit: Arc<dyn AuditSink>,
    call_locks: Mutex<HashMap<CallId, Arc<Mutex<()>>>>,
}

impl StatusReconciler {
    pub fn new(
        sessions: Arc<dyn CallSessionRepository>,
        tasks: Arc<dyn ScheduledTaskRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { sessions, tasks, audit, call_locks: Mutex::new(HashMap::new()) }
    }

    pub async fn apply(
        &self,
        call_id: &CallId,
        incoming: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<ReconcileOutcome, OrchestratorError> {
        let lock = self.lock_for(call_id).await;
        let _guard = lock.lock().await;

        let Some(session) =
            self.sessions.find_by_call_id(call_id).await.map_err(persistence)?
        else {
            tracing::warn!(
                event_name = "reconciler.unknown_call",
                call_id = %call_id.0,
                incoming = incoming.as_str(),
                "status event for unknown call id discarded"
            );
            self.audit.emit(
                AuditEvent::new(
                    Some(call_id.clone()),
                    None,
                    call_id.0.clone(),
                    "call.status_unknown_call",
                    AuditCategory::Ingress,
                    "reconciler",
                    AuditOutcome::Discarded,
                )
                .with_metadata("incoming", incoming.as_str()),
            );
            return Ok(ReconcileOutcome::UnknownCall);
        };

        let from = session.status;
        match lifecycle::apply(from, incoming) {
            TransitionOutcome::Advance(to) => {
                self.persist_transition(&session.call_id, to, duration_secs).await?;
                self.cascade_task(&session.task_id, to, &session.call_id, duration_secs).await?;
                self.audit_transition(call_id, &session.task_id, from, to, false);
                Ok(ReconcileOutcome::Applied { from, to, out_of_order: false })
            }
            TransitionOutcome::TerminalOverride(to) => {
                tracing::warn!(
                    event_name = "reconciler.out_of_order_terminal",
                    call_id = %call_id.0,
                    from = from.as_str(),
                    to = to.as_str(),
                    "terminal status arrived ahead of its expected predecessors"
                );
                self.persist_transition(&session.call_id, to, duration_secs).await?;
                self.cascade_task(&session.task_id, to, &session.call_id, duration_secs).await?;
                self.audit_transition(call_id, &session.task_id, from, to, true);
                Ok(ReconcileOutcome::Applied { from, to, out_of_order: true })
            }
            TransitionOutcome::Ignored => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(call_id.clone()),
                        session.task_id.clone(),
                        call_id.0.clone(),
                        "call.status_ignored",
                        AuditCategory::Call,
                        "reconciler",
                        AuditOutcome::Discarded,
                    )
                    .with_metadata("current", from.as_str())
                    .with_metadata("incoming", incoming.as_str()),
                );
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    async fn persist_transition(
        &self,
        call_id: &CallId,
        to: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<(), OrchestratorError> {
        let ended_at = to.is_terminal().then(Utc::now);
        self.sessions
            .apply_status(call_id, to, ended_at, duration_secs)
            .await
            .map_err(persistence)
    }

    /// Terminal call statuses close out the originating task. A completed
    /// conversation completes the task; busy, no-answer, and failure leave it
    /// failed so an operator can reschedule.
    async fn cascade_task(
        &self,
        task_id: &Option<outdial_core::domain::task::TaskId>,
        to: CallStatus,
        call_id: &CallId,
        duration_secs: Option<u32>,
    ) -> Result<(), OrchestratorError> {
        if !to.is_terminal() {
            return Ok(());
        }
        let Some(task_id) = task_id else {
            return Ok(());
        };

        let task_status = if to == CallStatus::Completed {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let metadata = serde_json::json!({
            "call_id": call_id.0,
            "call_status": to.as_str(),
            "duration_secs": duration_secs,
        })
        .to_string();

        self.tasks
            .finish(task_id, task_status, Some(metadata), Utc::now())
            .await
            .map_err(persistence)
    }

    fn audit_transition(
        &self,
        call_id: &CallId,
        task_id: &Option<outdial_core::domain::task::TaskId>,
        from: CallStatus,
        to: CallStatus,
        out_of_order: bool,
    ) {
        let outcome = if out_of_order { AuditOutcome::OutOfOrder } else { AuditOutcome::Success };
        self.audit.emit(
            AuditEvent::new(
                Some(call_id.clone()),
                task_id.clone(),
                call_id.0.clone(),
                "call.status_applied",
                AuditCategory::Call,
                "reconciler",
                outcome,
            )
            .with_metadata("from", from.as_str())
            .with_metadata("to", to.as_str()),
        );
    }

    async fn lock_for(&self, call_id: &CallId) -> Arc<Mutex<()>> {
        let mut locks = self.call_locks.lock().await;
        locks.entry(call_id.clone()).or_default().clone()
    }

    /// Drops the per-call lock entry once a call is terminal; late events
    /// re-create it briefly and then hit the absorbing state.
    pub async fn release(&self, call_id: &CallId) {
        let mut locks = self.call_locks.lock().await;
        locks.remove(call_id);
    }
}

fn persistence(error: RepositoryError) -> OrchestratorError {
    OrchestratorError::Persistence(error.to_string())
}
