use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use outdial_core::domain::lead::{CompanyId, LeadId};
use outdial_core::domain::task::{ScheduledTask, TaskId, TaskStatus, TaskType};

use super::call_session::parse_timestamp;
use super::{RepositoryError, ScheduledTaskRepository};
use crate::DbPool;

pub struct SqlScheduledTaskRepository {
    pool: DbPool,
}

impl SqlScheduledTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ScheduledTaskRepository for SqlScheduledTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<ScheduledTask>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                lead_id,
                company_id,
                task_type,
                scheduled_at,
                status,
                result_metadata,
                created_at,
                updated_at
             FROM scheduled_task
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_from_row).transpose()
    }

    async fn save(&self, task: &ScheduledTask) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO scheduled_task (
                id,
                lead_id,
                company_id,
                task_type,
                scheduled_at,
                status,
                result_metadata,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                lead_id = excluded.lead_id,
                company_id = excluded.company_id,
                task_type = excluded.task_type,
                scheduled_at = excluded.scheduled_at,
                status = excluded.status,
                result_metadata = excluded.result_metadata,
                updated_at = excluded.updated_at",
        )
        .bind(&task.task_id.0)
        .bind(&task.lead_id.0)
        .bind(&task.company_id.0)
        .bind(task.task_type.as_str())
        .bind(task.scheduled_at.to_rfc3339())
        .bind(task.status.as_str())
        .bind(task.result_metadata.as_deref())
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self, id: &TaskId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        // The WHERE clause on status is the whole claim protocol: exactly one
        // concurrent caller sees rows_affected == 1.
        let result = sqlx::query(
            "UPDATE scheduled_task SET status = 'in_progress', updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result_metadata: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE scheduled_task SET
                status = ?,
                result_metadata = COALESCE(?, result_metadata),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(result_metadata.as_deref())
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_calls(
        &self,
        now: DateTime<Utc>,
        tolerance_secs: u64,
    ) -> Result<Vec<ScheduledTask>, RepositoryError> {
        let tolerance = Duration::seconds(tolerance_secs.min(i64::MAX as u64) as i64);
        let window_start = (now - tolerance).to_rfc3339();
        let window_end = (now + tolerance).to_rfc3339();

        let rows = sqlx::query(
            "SELECT
                id,
                lead_id,
                company_id,
                task_type,
                scheduled_at,
                status,
                result_metadata,
                created_at,
                updated_at
             FROM scheduled_task
             WHERE status = 'pending'
               AND task_type = 'call'
               AND scheduled_at >= ?
               AND scheduled_at <= ?
             ORDER BY scheduled_at ASC",
        )
        .bind(&window_start)
        .bind(&window_end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_from_row).collect()
    }
}

fn task_from_row(row: SqliteRow) -> Result<ScheduledTask, RepositoryError> {
    let type_raw = row.try_get::<String, _>("task_type")?;
    let task_type = TaskType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task type `{type_raw}`")))?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_raw}`")))?;

    Ok(ScheduledTask {
        task_id: TaskId(row.try_get("id")?),
        lead_id: LeadId(row.try_get("lead_id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        task_type,
        scheduled_at: parse_timestamp("scheduled_at", row.try_get("scheduled_at")?)?,
        status,
        result_metadata: row.try_get("result_metadata")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use outdial_core::domain::task::{ScheduledTask, TaskId, TaskStatus, TaskType};

    use super::SqlScheduledTaskRepository;
    use crate::fixtures;
    use crate::migrations;
    use crate::repositories::ScheduledTaskRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        fixtures::seed_demo_company(&pool).await.expect("seed fixtures");
        pool
    }

    fn task_at(id: &str, task_type: TaskType, scheduled_at: DateTime<Utc>) -> ScheduledTask {
        ScheduledTask {
            task_id: TaskId(id.to_string()),
            lead_id: fixtures::demo_lead_id(),
            company_id: fixtures::demo_company_id(),
            task_type,
            scheduled_at,
            status: TaskStatus::Pending,
            result_metadata: None,
            created_at: scheduled_at,
            updated_at: scheduled_at,
        }
    }

    #[tokio::test]
    async fn task_round_trips_through_storage() {
        let pool = setup_pool().await;
        let repo = SqlScheduledTaskRepository::new(pool.clone());
        let task = task_at("T-RT-001", TaskType::Call, Utc::now());

        repo.save(&task).await.expect("save task");
        let found = repo.find_by_id(&task.task_id).await.expect("find").expect("exists");

        assert_eq!(found.task_id, task.task_id);
        assert_eq!(found.task_type, TaskType::Call);
        assert_eq!(found.status, TaskStatus::Pending);

        pool.close().await;
    }

    #[tokio::test]
    async fn a_task_is_claimed_exactly_once() {
        let pool = setup_pool().await;
        let repo = SqlScheduledTaskRepository::new(pool.clone());
        let task = task_at("T-CLAIM-001", TaskType::Call, Utc::now());
        repo.save(&task).await.expect("save task");

        let first = repo.claim(&task.task_id, Utc::now()).await.expect("first claim");
        let second = repo.claim(&task.task_id, Utc::now()).await.expect("second claim");

        assert!(first, "first claim should win");
        assert!(!second, "second claim should lose");

        let found = repo.find_by_id(&task.task_id).await.expect("find").expect("exists");
        assert_eq!(found.status, TaskStatus::InProgress);

        pool.close().await;
    }

    #[tokio::test]
    async fn due_calls_selects_only_pending_calls_inside_the_window() {
        let pool = setup_pool().await;
        let repo = SqlScheduledTaskRepository::new(pool.clone());
        let now = Utc::now();

        // The seeded demo task is also due now; claim it so only the tasks
        // saved below are in play.
        assert!(repo.claim(&fixtures::demo_task_id(), now).await.expect("claim demo task"));

        repo.save(&task_at("T-DUE-NOW", TaskType::Call, now)).await.expect("save");
        repo.save(&task_at("T-DUE-EDGE", TaskType::Call, now - Duration::seconds(250)))
            .await
            .expect("save");
        repo.save(&task_at("T-TOO-OLD", TaskType::Call, now - Duration::seconds(600)))
            .await
            .expect("save");
        repo.save(&task_at("T-TOO-NEW", TaskType::Call, now + Duration::seconds(600)))
            .await
            .expect("save");
        repo.save(&task_at("T-EMAIL", TaskType::Email, now)).await.expect("save");

        let mut claimed = task_at("T-CLAIMED", TaskType::Call, now);
        claimed.status = TaskStatus::InProgress;
        repo.save(&claimed).await.expect("save");

        let due = repo.due_calls(now, 300).await.expect("due calls");
        let ids: Vec<&str> = due.iter().map(|task| task.task_id.0.as_str()).collect();

        assert_eq!(ids, vec!["T-DUE-EDGE", "T-DUE-NOW"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn finish_writes_terminal_status_and_metadata() {
        let pool = setup_pool().await;
        let repo = SqlScheduledTaskRepository::new(pool.clone());
        let task = task_at("T-FIN-001", TaskType::Call, Utc::now());
        repo.save(&task).await.expect("save task");
        assert!(repo.claim(&task.task_id, Utc::now()).await.expect("claim"));

        repo.finish(
            &task.task_id,
            TaskStatus::Completed,
            Some("{\"call_id\":\"CA-1\",\"status\":\"completed\"}".to_string()),
            Utc::now(),
        )
        .await
        .expect("finish task");

        let found = repo.find_by_id(&task.task_id).await.expect("find").expect("exists");
        assert_eq!(found.status, TaskStatus::Completed);
        assert!(found.result_metadata.as_deref().unwrap_or_default().contains("CA-1"));

        pool.close().await;
    }
}
