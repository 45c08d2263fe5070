// src/db/contract_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        contracts::{BillingStatus, Contract, ContractCommissionInput, HealthScoreSnapshot, Product},
        pipeline::PipelineKind,
    },
};

const CONTRACT_COLUMNS: &str = "id, contact_id, opportunity_id, product_id, value, status, billing_status, \
     start_date, end_date, calculated_pb, created_at, updated_at";

/// Dados de um contrato novo.
pub struct NewContract {
    pub contact_id: Uuid,
    pub opportunity_id: Option<Uuid>,
    pub product_id: Uuid,
    pub value: Decimal,
    pub billing_status: BillingStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct ContractRepository {
    pool: PgPool,
}

impl ContractRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  PRODUTOS
    // =========================================================================

    pub async fn create_product<'e, E>(
        &self,
        executor: E,
        name: &str,
        category: &str,
        pb_rate: Option<Decimal>,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, category, pb_rate)
            VALUES ($1, $2, $3)
            RETURNING id, name, category, pb_rate, created_at
            "#,
        )
        .bind(name)
        .bind(category)
        .bind(pb_rate)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AppError::UniqueConstraintViolation(format!("Produto '{}'", name));
                }
            }
            e.into()
        })?;

        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, category, pb_rate, created_at FROM products ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    pub async fn create_contract<'e, E>(&self, executor: E, contract: &NewContract) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, Contract>(&format!(
            r#"
            INSERT INTO contracts (
                contact_id, opportunity_id, product_id, value, billing_status, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(contract.contact_id)
        .bind(contract.opportunity_id)
        .bind(contract.product_id)
        .bind(contract.value)
        .bind(contract.billing_status)
        .bind(contract.start_date)
        .bind(contract.end_date)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_foreign_key_violation() {
                    return AppError::ResourceNotFound("Contato, oportunidade ou produto".into());
                }
            }
            e.into()
        })?;

        Ok(created)
    }

    pub async fn list_contracts_for_contact(&self, contact_id: Uuid) -> Result<Vec<Contract>, AppError> {
        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE contact_id = $1 ORDER BY start_date DESC"
        ))
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(contracts)
    }

    pub async fn update_billing_status<'e, E>(
        &self,
        executor: E,
        contract_id: Uuid,
        billing_status: BillingStatus,
    ) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(&format!(
            r#"
            UPDATE contracts
            SET billing_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(contract_id)
        .bind(billing_status)
        .fetch_optional(executor)
        .await?;

        Ok(contract)
    }

    /// Contratos (não cancelados) ligados ao registro ganho, com o percentual do produto.
    pub async fn commission_inputs<'e, E>(
        &self,
        executor: E,
        kind: PipelineKind,
        entity_id: Uuid,
    ) -> Result<Vec<ContractCommissionInput>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let inputs = sqlx::query_as::<_, ContractCommissionInput>(&format!(
            r#"
            SELECT k.id AS contract_id, p.name AS product_name, k.value, p.pb_rate
            FROM contracts k
            JOIN products p ON p.id = k.product_id
            WHERE k.{} = $1 AND k.status <> 'canceled'
            ORDER BY k.created_at
            "#,
            kind.contract_fk()
        ))
        .bind(entity_id)
        .fetch_all(executor)
        .await?;

        Ok(inputs)
    }

    pub async fn set_calculated_pb<'e, E>(&self, executor: E, contract_id: Uuid, pb: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE contracts SET calculated_pb = $2, updated_at = NOW() WHERE id = $1")
            .bind(contract_id)
            .bind(pb)
            .execute(executor)
            .await?;

        Ok(())
    }

    // =========================================================================
    //  HEALTH SCORE
    // =========================================================================

    pub async fn record_health_score<'e, E>(
        &self,
        executor: E,
        contact_id: Uuid,
        score: i32,
    ) -> Result<HealthScoreSnapshot, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let snapshot = sqlx::query_as::<_, HealthScoreSnapshot>(
            r#"
            INSERT INTO health_score_snapshots (contact_id, score)
            VALUES ($1, $2)
            RETURNING id, contact_id, score, calculated_at
            "#,
        )
        .bind(contact_id)
        .bind(score)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_foreign_key_violation() {
                    return AppError::ResourceNotFound("Contato".into());
                }
            }
            e.into()
        })?;

        Ok(snapshot)
    }
}
