use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use outdial_agent::{ConversationEngine, LlmClient, OpenAiCompatClient};
use outdial_core::audit::{AuditSink, InMemoryAuditSink};
use outdial_core::config::{AppConfig, ConfigError, LoadOptions};
use outdial_db::repositories::{
    SqlCallSessionRepository, SqlKnowledgeRepository, SqlLeadRepository,
    SqlScheduledTaskRepository,
};
use outdial_db::{connect_with_settings, migrations, DbPool};
use outdial_telephony::{HttpTelephonyClient, StaticTelephonyClient, TelephonyClient};

use crate::dispatcher::DispatchRunner;
use crate::orchestrator::{CallOrchestrator, OrchestratorSettings};
use crate::reconciler::StatusReconciler;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<CallOrchestrator>,
    pub dispatcher: Arc<DispatchRunner>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        call_id = "unknown",
        task_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        call_id = "unknown",
        task_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        call_id = "unknown",
        task_id = "unknown",
        "database migrations applied"
    );

    let sessions = Arc::new(SqlCallSessionRepository::new(db_pool.clone()));
    let tasks = Arc::new(SqlScheduledTaskRepository::new(db_pool.clone()));
    let leads = Arc::new(SqlLeadRepository::new(db_pool.clone()));
    let knowledge = Arc::new(SqlKnowledgeRepository::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::default());

    let telephony: Arc<dyn TelephonyClient> =
        match HttpTelephonyClient::from_config(&config.telephony) {
            Some(client) => Arc::new(client),
            None => {
                info!(
                    event_name = "system.bootstrap.no_dial_mode",
                    correlation_id = "bootstrap",
                    call_id = "unknown",
                    task_id = "unknown",
                    "telephony credentials absent, placements stay in-process"
                );
                Arc::new(StaticTelephonyClient::new())
            }
        };

    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiCompatClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?,
    );
    let engine = ConversationEngine::new(llm, config.llm.timeout_secs);

    let reconciler =
        Arc::new(StatusReconciler::new(sessions.clone(), tasks.clone(), audit.clone()));
    let orchestrator = Arc::new(CallOrchestrator::new(
        sessions,
        leads,
        knowledge,
        telephony,
        engine,
        reconciler,
        audit,
        OrchestratorSettings {
            caller_number: config.telephony.caller_number.clone(),
            callback_base_url: config.telephony.callback_base_url.trim_end_matches('/').to_string(),
            gather_timeout_secs: config.conversation.gather_timeout_secs,
            max_turns: config.conversation.max_turns,
        },
    ));
    let dispatcher = Arc::new(DispatchRunner::new(
        tasks,
        orchestrator.clone(),
        config.dispatcher.tolerance_secs,
    ));

    Ok(Application { config, db_pool, orchestrator, dispatcher })
}
