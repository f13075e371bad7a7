use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use outdial_core::domain::lead::{CompanyId, Lead, LeadId};

use super::{LeadRepository, RepositoryError};
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, name, phone
             FROM lead
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(lead_from_row).transpose()
    }

    async fn save(&self, lead: &Lead) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO lead (id, company_id, name, phone, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                name = excluded.name,
                phone = excluded.phone,
                updated_at = excluded.updated_at",
        )
        .bind(&lead.id.0)
        .bind(&lead.company_id.0)
        .bind(&lead.name)
        .bind(&lead.phone)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
    })
}

#[cfg(test)]
mod tests {
    use outdial_core::domain::lead::{Lead, LeadId};

    use super::SqlLeadRepository;
    use crate::fixtures;
    use crate::migrations;
    use crate::repositories::LeadRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        fixtures::seed_demo_company(&pool).await.expect("seed fixtures");
        pool
    }

    #[tokio::test]
    async fn lead_round_trips_through_storage() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());
        let lead = Lead {
            id: LeadId("L-RT-001".to_string()),
            company_id: fixtures::demo_company_id(),
            name: "Jo Prospect".to_string(),
            phone: "+15551239999".to_string(),
        };

        repo.save(&lead).await.expect("save lead");
        let found = repo.find_by_id(&lead.id).await.expect("find").expect("exists");

        assert_eq!(found, lead);

        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_lead_finds_nothing() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        let found = repo.find_by_id(&LeadId("L-NOPE".to_string())).await.expect("query ok");
        assert!(found.is_none());

        pool.close().await;
    }
}
