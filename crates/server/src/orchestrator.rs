use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use outdial_agent::{ConversationContext, ConversationEngine};
use outdial_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use outdial_core::domain::call::{CallId, CallSession, CallStatus};
use outdial_core::domain::lead::LeadId;
use outdial_core::domain::task::{ScheduledTask, TaskId};
use outdial_core::knowledge::build_context;
use outdial_core::OrchestratorError;
use outdial_db::repositories::{
    CallSessionRepository, KnowledgeRepository, LeadRepository, RepositoryError,
};
use outdial_telephony::events::map_provider_status;
use outdial_telephony::{CallPlacement, PlacementError, ResponseDocument, TelephonyClient};

use crate::reconciler::{ReconcileOutcome, StatusReconciler};

const REPEAT_PROMPT: &str = "Sorry, I didn't hear anything. Could you say that again?";

/// Runtime knobs the orchestrator needs from the application config.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub caller_number: String,
    pub callback_base_url: String,
    pub gather_timeout_secs: u32,
    pub max_turns: u32,
}

/// Drives a call end to end: placement, the live webhook conversation, and
/// terminal wrap-up. Holds the in-memory conversation context for every
/// active call, keyed by the provider call id.
pub struct CallOrchestrator {
    sessions: Arc<dyn CallSessionRepository>,
    leads: Arc<dyn LeadRepository>,
    knowledge: Arc<dyn KnowledgeRepository>,
    telephony: Arc<dyn TelephonyClient>,
    engine: ConversationEngine,
    reconciler: Arc<StatusReconciler>,
    audit: Arc<dyn AuditSink>,
    settings: OrchestratorSettings,
    contexts: Mutex<HashMap<CallId, Arc<Mutex<ConversationContext>>>>,
}

impl CallOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn CallSessionRepository>,
        leads: Arc<dyn LeadRepository>,
        knowledge: Arc<dyn KnowledgeRepository>,
        telephony: Arc<dyn TelephonyClient>,
        engine: ConversationEngine,
        reconciler: Arc<StatusReconciler>,
        audit: Arc<dyn AuditSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sessions,
            leads,
            knowledge,
            telephony,
            engine,
            reconciler,
            audit,
            settings,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Places an outbound call to a lead. Resolves the lead and the company
    /// knowledge, normalizes the destination, asks the provider to dial, and
    /// registers the session plus its conversation context.
    pub async fn place_call(
        &self,
        lead_id: &LeadId,
        task_id: Option<TaskId>,
    ) -> Result<CallId, OrchestratorError> {
        let lead = self
            .leads
            .find_by_id(lead_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| OrchestratorError::not_found("lead", lead_id.0.clone()))?;

        let knowledge = self
            .knowledge
            .knowledge_for_company(&lead.company_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| OrchestratorError::not_found("company", lead.company_id.0.clone()))?;

        let to = outdial_telephony::normalize_number(&lead.phone).map_err(placement)?;
        let request = CallPlacement {
            to,
            from: self.settings.caller_number.clone(),
            answer_url: format!("{}/voice/answer", self.settings.callback_base_url),
            status_callback_url: format!("{}/voice/status", self.settings.callback_base_url),
        };

        let placed = self.telephony.place_call(&request).await.map_err(placement)?;

        let session = CallSession::new(
            placed.call_id.clone(),
            task_id.clone(),
            lead.id.clone(),
            lead.name.clone(),
            lead.company_id.clone(),
            Utc::now(),
        );
        self.sessions.save(&session).await.map_err(persistence)?;

        let context = self.engine.initialize(
            lead.name,
            build_context(&knowledge),
            knowledge.custom_script.clone(),
            self.settings.max_turns,
        );
        self.contexts
            .lock()
            .await
            .insert(placed.call_id.clone(), Arc::new(Mutex::new(context)));

        tracing::info!(
            event_name = "orchestrator.call_placed",
            call_id = %placed.call_id.0,
            lead_id = %lead_id.0,
            task_id = task_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            "call placed"
        );
        self.audit.emit(AuditEvent::new(
            Some(placed.call_id.clone()),
            task_id,
            placed.call_id.0.clone(),
            "call.placed",
            AuditCategory::Call,
            "orchestrator",
            AuditOutcome::Success,
        ));

        Ok(placed.call_id)
    }

    pub async fn place_call_for_task(
        &self,
        task: &ScheduledTask,
    ) -> Result<CallId, OrchestratorError> {
        self.place_call(&task.lead_id, Some(task.task_id.clone())).await
    }

    /// Answer webhook: the lead picked up. Moves the call to `answered` and
    /// speaks the opening line. Always yields a well-formed document.
    pub async fn answer_document(&self, call_id: &CallId) -> ResponseDocument {
        match self.reconciler.apply(call_id, CallStatus::Answered, None).await {
            Ok(ReconcileOutcome::UnknownCall) => return ResponseDocument::apology_hangup(),
            Ok(_) => {}
            Err(error) => {
                tracing::error!(
                    event_name = "orchestrator.answer_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "could not reconcile answer event"
                );
                return ResponseDocument::apology_hangup();
            }
        }

        let Some(context) = self.context_for(call_id).await else {
            return ResponseDocument::apology_hangup();
        };
        let mut context = context.lock().await;

        let greeting = self.engine.initial_greeting(&mut context).await;
        self.persist_recent_lines(call_id, &context, 1).await;

        ResponseDocument::speak_and_listen(
            greeting,
            self.speech_url(),
            self.settings.gather_timeout_secs,
        )
    }

    /// Speech webhook: one transcribed lead utterance in, the agent's next
    /// line out. Closing replies end the call; everything else gathers again.
    pub async fn speech_document(
        &self,
        call_id: &CallId,
        utterance: Option<String>,
    ) -> ResponseDocument {
        let Some(context) = self.context_for(call_id).await else {
            return ResponseDocument::apology_hangup();
        };

        let utterance = utterance.unwrap_or_default();
        if utterance.trim().is_empty() {
            return ResponseDocument::new().gather_speech(
                self.speech_url(),
                self.settings.gather_timeout_secs,
                Some(REPEAT_PROMPT.to_string()),
            );
        }

        // First speech implies the conversation is live; later calls hit the
        // lifecycle self-loop and are ignored.
        if let Err(error) =
            self.reconciler.apply(call_id, CallStatus::InConversation, None).await
        {
            tracing::error!(
                event_name = "orchestrator.conversation_mark_failed",
                call_id = %call_id.0,
                error = %error,
                "could not mark call in conversation"
            );
        }

        let mut context = context.lock().await;
        let reply = self.engine.process_turn(&mut context, &utterance).await;
        self.persist_recent_lines(call_id, &context, 2).await;
        if let Err(error) = self.sessions.record_turn(call_id).await {
            tracing::error!(
                event_name = "orchestrator.turn_persist_failed",
                call_id = %call_id.0,
                error = %error,
                "could not persist turn counter"
            );
        }

        if reply.closing {
            ResponseDocument::speak_and_hangup(reply.text)
        } else {
            ResponseDocument::speak_and_listen(
                reply.text,
                self.speech_url(),
                self.settings.gather_timeout_secs,
            )
        }
    }

    /// Status webhook: maps the provider vocabulary and pushes the event
    /// through the reconciler. Terminal transitions drop the in-memory
    /// context; a completed conversation is summarized first.
    pub async fn on_status(
        &self,
        call_id: &CallId,
        provider_status: &str,
        duration_secs: Option<u32>,
        recording_url: Option<String>,
    ) -> Result<ReconcileOutcome, OrchestratorError> {
        if let Some(url) = recording_url {
            if let Err(error) = self.sessions.set_recording_ref(call_id, &url).await {
                tracing::error!(
                    event_name = "orchestrator.recording_persist_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "could not persist recording reference"
                );
            }
        }

        let Some(status) = map_provider_status(provider_status) else {
            tracing::debug!(
                event_name = "orchestrator.status_unmapped",
                call_id = %call_id.0,
                provider_status,
                "provider status carries no lifecycle transition"
            );
            return Ok(ReconcileOutcome::Ignored);
        };

        let outcome = self.reconciler.apply(call_id, status, duration_secs).await?;

        if let ReconcileOutcome::Applied { to, .. } = &outcome {
            if to.is_terminal() {
                self.finish_call(call_id, *to).await;
            }
        }

        Ok(outcome)
    }

    async fn finish_call(&self, call_id: &CallId, to: CallStatus) {
        let context = self.contexts.lock().await.remove(call_id);
        self.reconciler.release(call_id).await;

        if to == CallStatus::Completed {
            if let Some(context) = context {
                let context = context.lock().await;
                let insights = self.engine.summarize(&context).await;
                if insights.available {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(call_id.clone()),
                            None,
                            call_id.0.clone(),
                            "conversation.summarized",
                            AuditCategory::Conversation,
                            "orchestrator",
                            AuditOutcome::Success,
                        )
                        .with_metadata(
                            "qualification",
                            insights.qualification.as_deref().unwrap_or("unknown"),
                        )
                        .with_metadata(
                            "sentiment",
                            insights.sentiment.as_deref().unwrap_or("unknown"),
                        )
                        .with_metadata("objections", insights.objections.join(", ")),
                    );
                } else {
                    tracing::info!(
                        event_name = "orchestrator.insights_unavailable",
                        call_id = %call_id.0,
                        "post-call insights unavailable"
                    );
                }
            }
        }
    }

    /// Mirrors the newest in-memory transcript lines into storage. The call
    /// keeps going even when this fails; the context still holds the lines.
    async fn persist_recent_lines(&self, call_id: &CallId, context: &ConversationContext, count: usize) {
        let start = context.transcript.len().saturating_sub(count);
        for entry in &context.transcript[start..] {
            if let Err(error) = self.sessions.append_transcript_entry(call_id, entry).await {
                tracing::error!(
                    event_name = "orchestrator.transcript_persist_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "could not persist transcript entry"
                );
            }
        }
    }

    async fn context_for(&self, call_id: &CallId) -> Option<Arc<Mutex<ConversationContext>>> {
        self.contexts.lock().await.get(call_id).cloned()
    }

    fn speech_url(&self) -> String {
        format!("{}/voice/speech", self.settings.callback_base_url)
    }
}

fn persistence(error: RepositoryError) -> OrchestratorError {
    OrchestratorError::Persistence(error.to_string())
}

fn placement(error: PlacementError) -> OrchestratorError {
    match error {
        PlacementError::InvalidNumber(raw) => OrchestratorError::InvalidNumber(raw),
        PlacementError::Provider(message) => OrchestratorError::Provider(message),
    }
}
