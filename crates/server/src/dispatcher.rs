use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use outdial_core::domain::task::TaskStatus;
use outdial_db::repositories::ScheduledTaskRepository;

use crate::orchestrator::CallOrchestrator;

/// One dispatch sweep, summarized. Logged after every tick and printed as
/// JSON by the operator CLI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub run_at: String,
    pub examined: usize,
    pub claimed: usize,
    pub placed: usize,
    pub failed: usize,
    pub outcomes: Vec<TaskDispatchOutcome>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskDispatchOutcome {
    pub task_id: String,
    pub outcome: &'static str,
    pub detail: String,
}

impl DispatchReport {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            run_at: now.to_rfc3339(),
            examined: 0,
            claimed: 0,
            placed: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }
}

/// Periodically sweeps for pending call tasks due inside the tolerance
/// window and hands each claimed task to the orchestrator. The claim is a
/// compare-and-set, so concurrent runners never double-dial a task.
pub struct DispatchRunner {
    tasks: Arc<dyn ScheduledTaskRepository>,
    orchestrator: Arc<CallOrchestrator>,
    tolerance_secs: u64,
}

impl DispatchRunner {
    pub fn new(
        tasks: Arc<dyn ScheduledTaskRepository>,
        orchestrator: Arc<CallOrchestrator>,
        tolerance_secs: u64,
    ) -> Self {
        Self { tasks, orchestrator, tolerance_secs }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> DispatchReport {
        let mut report = DispatchReport::empty(now);

        let due = match self.tasks.due_calls(now, self.tolerance_secs).await {
            Ok(due) => due,
            Err(error) => {
                tracing::error!(
                    event_name = "dispatcher.sweep_failed",
                    error = %error,
                    "could not query due call tasks"
                );
                return report;
            }
        };
        report.examined = due.len();

        for task in due {
            let claimed = match self.tasks.claim(&task.task_id, now).await {
                Ok(claimed) => claimed,
                Err(error) => {
                    tracing::error!(
                        event_name = "dispatcher.claim_failed",
                        task_id = %task.task_id.0,
                        error = %error,
                        "could not claim task"
                    );
                    report.failed += 1;
                    report.outcomes.push(TaskDispatchOutcome {
                        task_id: task.task_id.0.clone(),
                        outcome: "failed",
                        detail: error.to_string(),
                    });
                    continue;
                }
            };
            if !claimed {
                tracing::debug!(
                    event_name = "dispatcher.claim_lost",
                    task_id = %task.task_id.0,
                    "task already claimed elsewhere"
                );
                report.outcomes.push(TaskDispatchOutcome {
                    task_id: task.task_id.0.clone(),
                    outcome: "skipped",
                    detail: "claim lost to another runner".to_string(),
                });
                continue;
            }
            report.claimed += 1;

            match self.orchestrator.place_call_for_task(&task).await {
                Ok(call_id) => {
                    report.placed += 1;
                    report.outcomes.push(TaskDispatchOutcome {
                        task_id: task.task_id.0.clone(),
                        outcome: "placed",
                        detail: call_id.0.clone(),
                    });
                    tracing::info!(
                        event_name = "dispatcher.task_dispatched",
                        task_id = %task.task_id.0,
                        call_id = %call_id.0,
                        "call task dispatched"
                    );
                }
                Err(error) => {
                    report.failed += 1;
                    report.outcomes.push(TaskDispatchOutcome {
                        task_id: task.task_id.0.clone(),
                        outcome: "failed",
                        detail: error.to_string(),
                    });
                    tracing::error!(
                        event_name = "dispatcher.placement_failed",
                        task_id = %task.task_id.0,
                        error = %error,
                        "call placement failed, failing the task"
                    );
                    let metadata =
                        serde_json::json!({ "error": error.to_string() }).to_string();
                    if let Err(finish_error) = self
                        .tasks
                        .finish(&task.task_id, TaskStatus::Failed, Some(metadata), Utc::now())
                        .await
                    {
                        tracing::error!(
                            event_name = "dispatcher.finish_failed",
                            task_id = %task.task_id.0,
                            error = %finish_error,
                            "could not record task failure"
                        );
                    }
                }
            }
        }

        report
    }

    /// Runs sweeps forever on a fixed interval.
    pub fn spawn_interval(self: Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                let report = self.run_once(Utc::now()).await;
                if report.examined > 0 {
                    tracing::info!(
                        event_name = "dispatcher.sweep_complete",
                        examined = report.examined,
                        claimed = report.claimed,
                        placed = report.placed,
                        failed = report.failed,
                        "dispatch sweep complete"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use outdial_agent::{ConversationEngine, LlmClient};
    use outdial_core::audit::InMemoryAuditSink;
    use outdial_core::domain::task::{ScheduledTask, TaskId, TaskStatus, TaskType};
    use outdial_db::repositories::{
        ScheduledTaskRepository, SqlCallSessionRepository, SqlKnowledgeRepository,
        SqlLeadRepository, SqlScheduledTaskRepository,
    };
    use outdial_db::{connect_with_settings, fixtures, migrations, DbPool};
    use outdial_telephony::StaticTelephonyClient;

    use super::DispatchRunner;
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
        tasks: Arc<SqlScheduledTaskRepository>,
        telephony: Arc<StaticTelephonyClient>,
        runner: DispatchRunner,
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
            sessions,
            leads,
            knowledge,
            telephony.clone(),
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
        let runner = DispatchRunner::new(tasks.clone(), orchestrator, 300);

        Harness { pool, tasks, telephony, runner }
    }

    #[tokio::test]
    async fn sweep_claims_and_places_the_due_demo_task() {
        let harness = harness().await;

        let report = harness.runner.run_once(Utc::now()).await;

        assert_eq!(report.examined, 1);
        assert_eq!(report.claimed, 1);
        assert_eq!(report.placed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].task_id, fixtures::demo_task_id().0);
        assert_eq!(report.outcomes[0].outcome, "placed");
        assert_eq!(harness.telephony.placements().len(), 1);

        let task = harness
            .tasks
            .find_by_id(&fixtures::demo_task_id())
            .await
            .expect("find task")
            .expect("task exists");
        assert_eq!(task.status, TaskStatus::InProgress);

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn sweep_is_idempotent_once_a_task_is_claimed() {
        let harness = harness().await;

        harness.runner.run_once(Utc::now()).await;
        let second = harness.runner.run_once(Utc::now()).await;

        assert_eq!(second.examined, 0);
        assert_eq!(second.placed, 0);
        assert!(second.outcomes.is_empty());
        assert_eq!(harness.telephony.placements().len(), 1);

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn placement_failure_fails_the_task_with_the_error_recorded() {
        let harness = harness().await;
        harness.telephony.fail_next("upstream 500");

        let report = harness.runner.run_once(Utc::now()).await;

        assert_eq!(report.claimed, 1);
        assert_eq!(report.placed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes[0].outcome, "failed");
        assert!(report.outcomes[0].detail.contains("upstream 500"));

        let task = harness
            .tasks
            .find_by_id(&fixtures::demo_task_id())
            .await
            .expect("find task")
            .expect("task exists");
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.result_metadata.as_deref().unwrap_or_default().contains("upstream 500"));

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn one_failed_placement_does_not_block_the_rest_of_the_sweep() {
        let harness = harness().await;
        let now = Utc::now();

        // Due a minute before the demo task, so it is dispatched first and
        // eats the scripted failure.
        harness
            .tasks
            .save(&ScheduledTask {
                task_id: TaskId("T-EARLY".to_string()),
                lead_id: fixtures::demo_lead_id(),
                company_id: fixtures::demo_company_id(),
                task_type: TaskType::Call,
                scheduled_at: now - Duration::seconds(60),
                status: TaskStatus::Pending,
                result_metadata: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("save early task");
        harness.telephony.fail_next("upstream 500");

        let report = harness.runner.run_once(now).await;

        assert_eq!(report.examined, 2);
        assert_eq!(report.claimed, 2);
        assert_eq!(report.placed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes[0].task_id, "T-EARLY");
        assert_eq!(report.outcomes[0].outcome, "failed");
        assert_eq!(report.outcomes[1].task_id, fixtures::demo_task_id().0);
        assert_eq!(report.outcomes[1].outcome, "placed");
        assert_eq!(harness.telephony.placements().len(), 1);

        let early = harness
            .tasks
            .find_by_id(&TaskId("T-EARLY".to_string()))
            .await
            .expect("find task")
            .expect("task exists");
        assert_eq!(early.status, TaskStatus::Failed);

        let demo = harness
            .tasks
            .find_by_id(&fixtures::demo_task_id())
            .await
            .expect("find task")
            .expect("task exists");
        assert_eq!(demo.status, TaskStatus::InProgress);

        harness.pool.close().await;
    }

    #[tokio::test]
    async fn report_serializes_for_operator_output() {
        let harness = harness().await;

        let report = harness.runner.run_once(Utc::now()).await;
        let json = serde_json::to_string(&report).expect("report serializes");

        assert!(json.contains("\"run_at\""));
        assert!(json.contains("\"outcome\":\"placed\""));

        harness.pool.close().await;
    }
}
