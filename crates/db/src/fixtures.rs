//! Demo dataset used by tests and local smoke runs: one company with a
//! product, a service, one lead, and a pending call task due now.

use chrono::Utc;

use outdial_core::domain::lead::{CompanyId, LeadId};
use outdial_core::domain::task::TaskId;

use crate::repositories::RepositoryError;
use crate::DbPool;

pub fn demo_company_id() -> CompanyId {
    CompanyId("C-DEMO".to_string())
}

pub fn demo_lead_id() -> LeadId {
    LeadId("L-DEMO".to_string())
}

pub fn demo_task_id() -> TaskId {
    TaskId("T-DEMO".to_string())
}

pub async fn seed_demo_company(pool: &DbPool) -> Result<(), RepositoryError> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO company (id, name, description, sales_instructions, custom_script, created_at, updated_at)
         VALUES (?, 'Acme Widgets', 'We make widgets for every budget.',
                 'Lead with the trial offer.', 'Hello {name}, this is Acme calling about widgets!',
                 ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(demo_company_id().0)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO product (id, company_id, name, price, description, features_json, created_at, updated_at)
         VALUES ('P-DEMO', ?, 'Widget Pro', '199.99', 'The flagship widget.',
                 '[\"durable\",\"modular\"]', ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(demo_company_id().0)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO service (id, company_id, name, price, description, benefits_json, created_at, updated_at)
         VALUES ('S-DEMO', ?, 'Installation', NULL, 'On-site setup.',
                 '[\"same-day setup\"]', ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(demo_company_id().0)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO lead (id, company_id, name, phone, created_at, updated_at)
         VALUES (?, ?, 'Dana Demo', '+15551230000', ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(demo_lead_id().0)
    .bind(demo_company_id().0)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO scheduled_task (id, lead_id, company_id, task_type, scheduled_at, status, result_metadata, created_at, updated_at)
         VALUES (?, ?, ?, 'call', ?, 'pending', NULL, ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(demo_task_id().0)
    .bind(demo_lead_id().0)
    .bind(demo_company_id().0)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::seed_demo_company;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool =
            connect_with_settings("sqlite::memory:?cache=shared", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        seed_demo_company(&pool).await.expect("first seed");
        seed_demo_company(&pool).await.expect("second seed");

        pool.close().await;
    }
}
