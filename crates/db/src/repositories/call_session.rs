use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use outdial_core::domain::call::{CallId, CallSession, CallStatus, Speaker, TranscriptEntry};
use outdial_core::domain::lead::{CompanyId, LeadId};
use outdial_core::domain::task::TaskId;

use super::{CallSessionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCallSessionRepository {
    pool: DbPool,
}

impl SqlCallSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CallSessionRepository for SqlCallSessionRepository {
    async fn find_by_call_id(&self, id: &CallId) -> Result<Option<CallSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                call_id,
                task_id,
                lead_id,
                lead_name,
                company_id,
                status,
                started_at,
                ended_at,
                duration_secs,
                recording_ref,
                turn_count
             FROM call_session
             WHERE call_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut session = session_from_row(row)?;

        let transcript_rows = sqlx::query(
            "SELECT speaker, text, spoken_at
             FROM call_transcript_entry
             WHERE call_id = ?
             ORDER BY seq ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        session.transcript = transcript_rows
            .into_iter()
            .map(transcript_entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(session))
    }

    async fn save(&self, session: &CallSession) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO call_session (
                call_id,
                task_id,
                lead_id,
                lead_name,
                company_id,
                status,
                started_at,
                ended_at,
                duration_secs,
                recording_ref,
                turn_count,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(call_id) DO UPDATE SET
                task_id = excluded.task_id,
                lead_id = excluded.lead_id,
                lead_name = excluded.lead_name,
                company_id = excluded.company_id,
                status = excluded.status,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                duration_secs = excluded.duration_secs,
                recording_ref = excluded.recording_ref,
                turn_count = excluded.turn_count,
                updated_at = excluded.updated_at",
        )
        .bind(&session.call_id.0)
        .bind(session.task_id.as_ref().map(|id| id.0.as_str()))
        .bind(&session.lead_id.0)
        .bind(&session.lead_name)
        .bind(&session.company_id.0)
        .bind(session.status.as_str())
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|value| value.to_rfc3339()))
        .bind(session.duration_secs.map(i64::from))
        .bind(session.recording_ref.as_deref())
        .bind(i64::from(session.turn_count))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_transcript_entry(
        &self,
        call_id: &CallId,
        entry: &TranscriptEntry,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO call_transcript_entry (call_id, seq, speaker, text, spoken_at)
             SELECT ?, COALESCE(MAX(seq) + 1, 0), ?, ?, ?
             FROM call_transcript_entry
             WHERE call_id = ?",
        )
        .bind(&call_id.0)
        .bind(entry.speaker.as_str())
        .bind(&entry.text)
        .bind(entry.timestamp.to_rfc3339())
        .bind(&call_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_status(
        &self,
        call_id: &CallId,
        status: CallStatus,
        ended_at: Option<DateTime<Utc>>,
        duration_secs: Option<u32>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE call_session SET
                status = ?,
                ended_at = COALESCE(?, ended_at),
                duration_secs = COALESCE(?, duration_secs),
                updated_at = ?
             WHERE call_id = ?",
        )
        .bind(status.as_str())
        .bind(ended_at.map(|value| value.to_rfc3339()))
        .bind(duration_secs.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .bind(&call_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_turn(&self, call_id: &CallId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE call_session SET turn_count = turn_count + 1, updated_at = ?
             WHERE call_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&call_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_recording_ref(
        &self,
        call_id: &CallId,
        recording_ref: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE call_session SET recording_ref = ?, updated_at = ?
             WHERE call_id = ?",
        )
        .bind(recording_ref)
        .bind(Utc::now().to_rfc3339())
        .bind(&call_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn session_from_row(row: SqliteRow) -> Result<CallSession, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CallStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown call status `{status_raw}`")))?;

    Ok(CallSession {
        call_id: CallId(row.try_get("call_id")?),
        task_id: row.try_get::<Option<String>, _>("task_id")?.map(TaskId),
        lead_id: LeadId(row.try_get("lead_id")?),
        lead_name: row.try_get("lead_name")?,
        company_id: CompanyId(row.try_get("company_id")?),
        status,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        ended_at: parse_optional_timestamp("ended_at", row.try_get("ended_at")?)?,
        duration_secs: row
            .try_get::<Option<i64>, _>("duration_secs")?
            .map(|value| parse_u32("duration_secs", value))
            .transpose()?,
        transcript: Vec::new(),
        recording_ref: row.try_get("recording_ref")?,
        turn_count: parse_u32("turn_count", row.try_get("turn_count")?)?,
    })
}

fn transcript_entry_from_row(row: SqliteRow) -> Result<TranscriptEntry, RepositoryError> {
    let speaker_raw = row.try_get::<String, _>("speaker")?;
    let speaker = Speaker::parse(&speaker_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown speaker `{speaker_raw}`")))?;

    Ok(TranscriptEntry {
        speaker,
        text: row.try_get("text")?,
        timestamp: parse_timestamp("spoken_at", row.try_get("spoken_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
