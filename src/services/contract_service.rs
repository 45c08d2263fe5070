// src/services/contract_service.rs

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::set_actor_context, error::AppError},
    db::{contract_repo::NewContract, ContractRepository},
    middleware::acting::Actor,
    models::contracts::{BillingStatus, Contract, HealthScoreSnapshot, Product},
};

#[derive(Clone)]
pub struct ContractService {
    repo: ContractRepository,
    pool: PgPool,
}

impl ContractService {
    pub fn new(repo: ContractRepository, pool: PgPool) -> Self {
        Self { repo, pool }
    }

    pub async fn create_product(&self, name: &str, category: &str, pb_rate: Option<Decimal>) -> Result<Product, AppError> {
        self.repo
            .create_product(&self.pool, name.trim(), category.trim(), pb_rate)
            .await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        self.repo.list_products().await
    }

    pub async fn create_contract(&self, actor: &Actor, contract: NewContract) -> Result<Contract, AppError> {
        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let created = self.repo.create_contract(&mut *tx, &contract).await?;
        tx.commit().await?;

        tracing::info!(contract_id = %created.id, contact_id = %created.contact_id, "📄 Contrato registrado");
        Ok(created)
    }

    pub async fn list_contracts_for_contact(&self, contact_id: Uuid) -> Result<Vec<Contract>, AppError> {
        self.repo.list_contracts_for_contact(contact_id).await
    }

    /// Recebe o status no vocabulário do gateway de pagamento e grava o equivalente local.
    pub async fn sync_billing_status(&self, contract_id: Uuid, gateway_status: &str) -> Result<Contract, AppError> {
        let status = BillingStatus::from_gateway(gateway_status)
            .ok_or_else(|| AppError::UnknownBillingStatus(gateway_status.to_string()))?;

        let contract = self
            .repo
            .update_billing_status(&self.pool, contract_id, status)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Contrato".into()))?;

        tracing::info!(contract_id = %contract_id, gateway_status, billing_status = ?status, "💳 Cobrança sincronizada");
        Ok(contract)
    }

    pub async fn record_health_score(&self, contact_id: Uuid, score: i32) -> Result<HealthScoreSnapshot, AppError> {
        self.repo.record_health_score(&self.pool, contact_id, score).await
    }
}
