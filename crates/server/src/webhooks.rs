use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tracing::{error, info};

use outdial_core::domain::call::CallId;
use outdial_telephony::{ResponseDocument, SpeechCallback, StatusCallback};

use crate::orchestrator::CallOrchestrator;

/// Every handler acknowledges with 200 no matter what happened internally.
/// The provider retries non-success responses, and a retry storm on a call
/// we already discarded helps nobody.
#[derive(Clone)]
pub struct WebhookState {
    pub orchestrator: Arc<CallOrchestrator>,
}

pub fn router(orchestrator: Arc<CallOrchestrator>) -> Router {
    Router::new()
        .route("/voice/answer", post(answer))
        .route("/voice/speech", post(speech))
        .route("/voice/status", post(status))
        .with_state(WebhookState { orchestrator })
}

pub async fn spawn(bind_address: &str, port: u16, orchestrator: Arc<CallOrchestrator>) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.webhooks.start",
        correlation_id = "bootstrap",
        call_id = "unknown",
        task_id = "unknown",
        bind_address = %address,
        "webhook endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(orchestrator)).await {
            error!(
                event_name = "system.webhooks.error",
                correlation_id = "bootstrap",
                call_id = "unknown",
                task_id = "unknown",
                error = %error,
                "webhook server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// The provider posts more fields than we read; serde drops the rest.
#[derive(Clone, Debug, Deserialize)]
pub struct AnswerCallback {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
}

async fn answer(
    State(state): State<WebhookState>,
    Form(payload): Form<AnswerCallback>,
) -> impl IntoResponse {
    let call_id = CallId(payload.call_sid);
    let document = state.orchestrator.answer_document(&call_id).await;
    xml_response(document)
}

async fn speech(
    State(state): State<WebhookState>,
    Form(payload): Form<SpeechCallback>,
) -> impl IntoResponse {
    let call_id = CallId(payload.call_sid);
    let document =
        state.orchestrator.speech_document(&call_id, payload.speech_result).await;
    xml_response(document)
}

async fn status(
    State(state): State<WebhookState>,
    Form(payload): Form<StatusCallback>,
) -> StatusCode {
    let call_id = CallId(payload.call_sid);
    if let Err(error) = state
        .orchestrator
        .on_status(&call_id, &payload.call_status, payload.call_duration, payload.recording_url)
        .await
    {
        error!(
            event_name = "webhooks.status_failed",
            call_id = %call_id.0,
            provider_status = %payload.call_status,
            error = %error,
            "status event could not be applied"
        );
    }
    StatusCode::OK
}

fn xml_response(document: ResponseDocument) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/xml")], document.to_xml())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use tower::util::ServiceExt;

    use outdial_agent::{ConversationEngine, LlmClient};
    use outdial_core::audit::InMemoryAuditSink;
    use outdial_core::domain::call::CallStatus;
    use outdial_db::repositories::{
        CallSessionRepository, SqlCallSessionRepository, SqlKnowledgeRepository,
        SqlLeadRepository, SqlScheduledTaskRepository,
    };
    use outdial_db::{connect_with_settings, fixtures, migrations, DbPool};
    use outdial_telephony::StaticTelephonyClient;

    use crate::orchestrator::{CallOrchestrator, OrchestratorSettings};
    use crate::reconciler::StatusReconciler;

    struct QuietClient;

    #[async_trait]
    impl LlmClient for QuietClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("Sure.".to_string())
        }
    }

    struct Harness {
        pool: DbPool,
        sessions: Arc<SqlCallSessionRepository>,
        orchestrator: Arc<CallOrchestrator>,
        router: Router,
    }

    async fn harness() -> Harness {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        fixtures::seed_demo_company(&pool).await.expect("seed fixtures");

        let sessions = Arc::new(SqlCallSessionRepository::new(pool.clone()));
        let tasks = Arc::new(SqlScheduledTaskRepository::new(pool.clone()));
        let leads = Arc::new(SqlLeadRepository::new(pool.clone()));
        let knowledge = Arc::new(SqlKnowledgeRepository::new(pool.clone()));
        let audit = Arc::new(InMemoryAuditSink::default());
        let telephony = Arc::new(StaticTelephonyClient::new());
        let reconciler =
            Arc::new(StatusReconciler::new(sessions.clone(), tasks.clone(), audit.clone()));

        let orchestrator = Arc::new(CallOrchestrator::new(
            sessions.clone(),
            leads,
            knowledge,
            telephony,
            ConversationEngine::new(Arc::new(QuietClient), 5),
            reconciler,
            audit,
            OrchestratorSettings {
                caller_number: "+15005550006".to_string(),
                callback_base_url: "http://localhost:8088".to_string(),
                gather_timeout_secs: 5,
                max_turns: 10,
            },
        ));
        let router = super::router(orchestrator.clone());

        Harness { pool, sessions, orchestrator, router }
    }

    fn form_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request builds")
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        String::from_utf8(bytes.to_vec()).expect("body is utf-8")
    }

    #[tokio::test]
    async fn answer_webhook_returns_an_xml_document() {
        let harness = harness().await;
        let call_id = harness
            .orchestrator
            .place_call(&fixtures::demo_lead_id(), None)
            .await
            .expect("placement succeeds");

        let response = harness
            .router
            .clone()
            .oneshot(form_request("/voice/answer", format!("CallSid={}", call_id.0)))
            .await
            .expect("request completes");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.to_str().unwrap()),
            Some("application/xml")
        );
        let body = body_string(response).await;
        assert!(body.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#));
        assert!(body.contains("<Gather"));

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn speech_webhook_feeds_the_conversation() {
        let harness = harness().await;
        let call_id = harness
            .orchestrator
            .place_call(&fixtures::demo_lead_id(), None)
            .await
            .expect("placement succeeds");
        harness.orchestrator.answer_document(&call_id).await;

        let response = harness
            .router
            .clone()
            .oneshot(form_request(
                "/voice/speech",
                format!("CallSid={}&SpeechResult=Tell+me+more", call_id.0),
            ))
            .await
            .expect("request completes");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("<Say>Sure.</Say>"));

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn status_webhook_applies_the_transition_and_acknowledges() {
        let harness = harness().await;
        let call_id = harness
            .orchestrator
            .place_call(&fixtures::demo_lead_id(), None)
            .await
            .expect("placement succeeds");

        let response = harness
            .router
            .clone()
            .oneshot(form_request(
                "/voice/status",
                format!(
                    "CallSid={}&CallStatus=completed&CallDuration=42\
                     &RecordingUrl=https%3A%2F%2Fapi.provider.test%2Frecordings%2FRE-0042",
                    call_id.0
                ),
            ))
            .await
            .expect("request completes");

        assert_eq!(response.status(), StatusCode::OK);
        let session = harness
            .sessions
            .find_by_call_id(&call_id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(session.status, CallStatus::Completed);
        assert_eq!(session.duration_secs, Some(42));
        assert_eq!(
            session.recording_ref.as_deref(),
            Some("https://api.provider.test/recordings/RE-0042")
        );

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn unknown_call_ids_still_get_a_success_acknowledgement() {
        let harness = harness().await;

        let status_response = harness
            .router
            .clone()
            .oneshot(form_request(
                "/voice/status",
                "CallSid=CA-GHOST&CallStatus=completed".to_string(),
            ))
            .await
            .expect("request completes");
        assert_eq!(status_response.status(), StatusCode::OK);

        let answer_response = harness
            .router
            .clone()
            .oneshot(form_request("/voice/answer", "CallSid=CA-GHOST".to_string()))
            .await
            .expect("request completes");
        assert_eq!(answer_response.status(), StatusCode::OK);
        let body = body_string(answer_response).await;
        assert!(body.contains("<Hangup/>"));

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn empty_speech_result_reprompts() {
        let harness = harness().await;
        let call_id = harness
            .orchestrator
            .place_call(&fixtures::demo_lead_id(), None)
            .await
            .expect("placement succeeds");
        harness.orchestrator.answer_document(&call_id).await;

        let response = harness
            .router
            .clone()
            .oneshot(form_request("/voice/speech", format!("CallSid={}", call_id.0)))
            .await
            .expect("request completes");

        let body = body_string(response).await;
        assert!(body.contains("<Gather"));
        assert!(!body.contains("<Hangup/>"));

        harness.pool.close().await;
    }
}
