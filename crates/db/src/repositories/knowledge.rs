use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use outdial_core::domain::knowledge::{CompanyKnowledge, Product, Service};
use outdial_core::domain::lead::CompanyId;

use super::{KnowledgeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlKnowledgeRepository {
    pool: DbPool,
}

impl SqlKnowledgeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KnowledgeRepository for SqlKnowledgeRepository {
    async fn knowledge_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<CompanyKnowledge>, RepositoryError> {
        let company_row = sqlx::query(
            "SELECT name, description, sales_instructions, custom_script
             FROM company
             WHERE id = ?",
        )
        .bind(&company_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(company_row) = company_row else {
            return Ok(None);
        };

        let product_rows = sqlx::query(
            "SELECT name, price, description, features_json
             FROM product
             WHERE company_id = ?
             ORDER BY name ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        let service_rows = sqlx::query(
            "SELECT name, price, description, benefits_json
             FROM service
             WHERE company_id = ?
             ORDER BY name ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(CompanyKnowledge {
            company_name: company_row.try_get("name")?,
            description: company_row.try_get("description")?,
            products: product_rows
                .into_iter()
                .map(product_from_row)
                .collect::<Result<Vec<_>, _>>()?,
            services: service_rows
                .into_iter()
                .map(service_from_row)
                .collect::<Result<Vec<_>, _>>()?,
            sales_instructions: company_row.try_get("sales_instructions")?,
            custom_script: company_row.try_get("custom_script")?,
        }))
    }
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        name: row.try_get("name")?,
        price: parse_price(row.try_get("price")?)?,
        description: row.try_get("description")?,
        features: parse_string_list("features_json", row.try_get("features_json")?)?,
    })
}

fn service_from_row(row: SqliteRow) -> Result<Service, RepositoryError> {
    Ok(Service {
        name: row.try_get("name")?,
        price: parse_price(row.try_get("price")?)?,
        description: row.try_get("description")?,
        benefits: parse_string_list("benefits_json", row.try_get("benefits_json")?)?,
    })
}

fn parse_price(value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|error| RepositoryError::Decode(format!("invalid price `{raw}`: {error}")))
        })
        .transpose()
}

fn parse_string_list(column: &str, value: String) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(&value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}
