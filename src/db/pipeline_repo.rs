// src/db/pipeline_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::pipeline::{
        Contact, Funnel, HistoryAction, HistoryRecord, LostReason, Opportunity, PipelineKind,
        PipelineState, PipelineStatus, Stage, StageRef, SuccessorTarget,
    },
};

const CONTACT_COLUMNS: &str = "id, owner_id, full_name, email, phone, marital_status, gender, goal_types, \
     status, funnel_id, stage_id, stage_entered_at, lost_reason_id, lost_at, lost_from_stage_id, \
     converted_at, created_at, updated_at";

const OPPORTUNITY_COLUMNS: &str = "id, contact_id, owner_id, title, value, \
     status, funnel_id, stage_id, stage_entered_at, lost_reason_id, lost_at, lost_from_stage_id, \
     converted_at, created_at, updated_at";

const STATE_FIELDS: &str = "status, funnel_id, stage_id, stage_entered_at, lost_reason_id, lost_at, \
     lost_from_stage_id, converted_at";

fn state_columns(kind: PipelineKind) -> String {
    format!("id, owner_id, {} AS contact_id, {STATE_FIELDS}", kind.contact_column())
}

fn map_fk_violation(e: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_foreign_key_violation() {
            return AppError::ResourceNotFound(what.to_string());
        }
        if db_err.is_unique_violation() {
            return AppError::UniqueConstraintViolation(what.to_string());
        }
    }
    e.into()
}

/// Dados de um contato novo.
pub struct NewContact<'a> {
    pub owner_id: Uuid,
    pub full_name: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub marital_status: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub goal_types: &'a [String],
}

#[derive(Clone)]
pub struct PipelineRepository {
    pool: PgPool,
}

impl PipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  FUNIS, ETAPAS E MOTIVOS DE PERDA
    // =========================================================================

    pub async fn create_funnel<'e, E>(&self, executor: E, name: &str) -> Result<Funnel, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Funnel>("INSERT INTO funnels (name) VALUES ($1) RETURNING id, name, created_at")
            .bind(name)
            .fetch_one(executor)
            .await
            .map_err(|e| map_fk_violation(e, "Funil"))
    }

    pub async fn list_funnels(&self) -> Result<Vec<Funnel>, AppError> {
        let funnels = sqlx::query_as::<_, Funnel>("SELECT id, name, created_at FROM funnels ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(funnels)
    }

    pub async fn create_stage<'e, E>(
        &self,
        executor: E,
        funnel_id: Uuid,
        name: &str,
        position: i32,
    ) -> Result<Stage, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Stage>(
            r#"
            INSERT INTO funnel_stages (funnel_id, name, position)
            VALUES ($1, $2, $3)
            RETURNING id, funnel_id, name, position, created_at
            "#,
        )
        .bind(funnel_id)
        .bind(name)
        .bind(position)
        .fetch_one(executor)
        .await
        .map_err(|e| map_fk_violation(e, "Etapa"))
    }

    pub async fn list_stages(&self, funnel_id: Uuid) -> Result<Vec<Stage>, AppError> {
        let stages = sqlx::query_as::<_, Stage>(
            r#"
            SELECT id, funnel_id, name, position, created_at
            FROM funnel_stages
            WHERE funnel_id = $1
            ORDER BY position, name
            "#,
        )
        .bind(funnel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(stages)
    }

    pub async fn find_stage_ref<'e, E>(&self, executor: E, stage_id: Uuid) -> Result<Option<StageRef>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stage = sqlx::query_as::<_, StageRef>(
            r#"
            SELECT s.id AS stage_id, s.name AS stage_name, f.id AS funnel_id, f.name AS funnel_name
            FROM funnel_stages s
            JOIN funnels f ON f.id = s.funnel_id
            WHERE s.id = $1
            "#,
        )
        .bind(stage_id)
        .fetch_optional(executor)
        .await?;
        Ok(stage)
    }

    /// Primeira etapa (menor `position`) do funil.
    pub async fn first_stage<'e, E>(&self, executor: E, funnel_id: Uuid) -> Result<Option<StageRef>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stage = sqlx::query_as::<_, StageRef>(
            r#"
            SELECT s.id AS stage_id, s.name AS stage_name, f.id AS funnel_id, f.name AS funnel_name
            FROM funnel_stages s
            JOIN funnels f ON f.id = s.funnel_id
            WHERE f.id = $1
            ORDER BY s.position, s.name
            LIMIT 1
            "#,
        )
        .bind(funnel_id)
        .fetch_optional(executor)
        .await?;
        Ok(stage)
    }

    pub async fn create_lost_reason<'e, E>(&self, executor: E, name: &str) -> Result<LostReason, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, LostReason>(
            "INSERT INTO lost_reasons (name) VALUES ($1) RETURNING id, name, is_active, created_at",
        )
        .bind(name)
        .fetch_one(executor)
        .await
        .map_err(|e| map_fk_violation(e, "Motivo de perda"))
    }

    pub async fn list_lost_reasons(&self) -> Result<Vec<LostReason>, AppError> {
        let reasons = sqlx::query_as::<_, LostReason>(
            "SELECT id, name, is_active, created_at FROM lost_reasons WHERE is_active = TRUE ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(reasons)
    }

    pub async fn lost_reason_exists<'e, E>(&self, executor: E, id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM lost_reasons WHERE id = $1 AND is_active = TRUE)",
        )
        .bind(id)
        .fetch_one(executor)
        .await?;
        Ok(exists)
    }

    // =========================================================================
    //  CONTATOS E OPORTUNIDADES
    // =========================================================================

    pub async fn create_contact<'e, E>(
        &self,
        executor: E,
        contact: &NewContact<'_>,
        stage: &StageRef,
    ) -> Result<Contact, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts (
                owner_id, full_name, email, phone, marital_status, gender, goal_types,
                funnel_id, stage_id, stage_entered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(contact.owner_id)
        .bind(contact.full_name)
        .bind(contact.email)
        .bind(contact.phone)
        .bind(contact.marital_status)
        .bind(contact.gender)
        .bind(contact.goal_types)
        .bind(stage.funnel_id)
        .bind(stage.stage_id)
        .fetch_one(executor)
        .await
        .map_err(|e| map_fk_violation(e, "Contato"))
    }

    pub async fn list_contacts(&self, owner_id: Uuid, status: Option<PipelineStatus>) -> Result<Vec<Contact>, AppError> {
        let contacts = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE owner_id = $1 AND ($2::pipeline_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    pub async fn create_opportunity<'e, E>(
        &self,
        executor: E,
        contact_id: Uuid,
        owner_id: Uuid,
        title: &str,
        value: Option<Decimal>,
        stage: &StageRef,
    ) -> Result<Opportunity, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Opportunity>(&format!(
            r#"
            INSERT INTO opportunities (
                contact_id, owner_id, title, value, funnel_id, stage_id, stage_entered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING {OPPORTUNITY_COLUMNS}
            "#
        ))
        .bind(contact_id)
        .bind(owner_id)
        .bind(title)
        .bind(value)
        .bind(stage.funnel_id)
        .bind(stage.stage_id)
        .fetch_one(executor)
        .await
        .map_err(|e| map_fk_violation(e, "Contato"))
    }

    pub async fn list_opportunities(
        &self,
        owner_id: Uuid,
        status: Option<PipelineStatus>,
    ) -> Result<Vec<Opportunity>, AppError> {
        let opportunities = sqlx::query_as::<_, Opportunity>(&format!(
            r#"
            SELECT {OPPORTUNITY_COLUMNS}
            FROM opportunities
            WHERE owner_id = $1 AND ($2::pipeline_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(opportunities)
    }

    // =========================================================================
    //  ESTADO DO FUNIL (comum a contatos e oportunidades)
    // =========================================================================

    /// Lê e trava a linha até o fim da transação.
    pub async fn load_state_for_update(
        &self,
        conn: &mut PgConnection,
        kind: PipelineKind,
        id: Uuid,
    ) -> Result<Option<PipelineState>, AppError> {
        let state = sqlx::query_as::<_, PipelineState>(&format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            state_columns(kind),
            kind.table()
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(state)
    }

    /// Grava o próximo estado se o status ainda for `expected`.
    /// Retorna `false` quando outra operação mudou o registro antes.
    pub async fn update_state(
        &self,
        conn: &mut PgConnection,
        kind: PipelineKind,
        next: &PipelineState,
        expected: PipelineStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET status = $3, funnel_id = $4, stage_id = $5, stage_entered_at = $6,
                lost_reason_id = $7, lost_at = $8, lost_from_stage_id = $9,
                converted_at = $10, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
            kind.table()
        ))
        .bind(next.id)
        .bind(expected)
        .bind(next.status)
        .bind(next.funnel_id)
        .bind(next.stage_id)
        .bind(next.stage_entered_at)
        .bind(next.lost_reason_id)
        .bind(next.lost_at)
        .bind(next.lost_from_stage_id)
        .bind(next.converted_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_history<'e, E>(
        &self,
        executor: E,
        kind: PipelineKind,
        entity_id: Uuid,
        action: HistoryAction,
        from_stage_id: Option<Uuid>,
        to_stage_id: Option<Uuid>,
        actor_id: Uuid,
        notes: Option<&str>,
    ) -> Result<HistoryRecord, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let fk = kind.history_fk();
        let record = sqlx::query_as::<_, HistoryRecord>(&format!(
            r#"
            INSERT INTO {} ({fk}, action, from_stage_id, to_stage_id, actor_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, {fk} AS entity_id, action, from_stage_id, to_stage_id, actor_id, notes, created_at
            "#,
            kind.history_table()
        ))
        .bind(entity_id)
        .bind(action)
        .bind(from_stage_id)
        .bind(to_stage_id)
        .bind(actor_id)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(record)
    }

    /// Histórico em ordem cronológica.
    pub async fn list_history(&self, kind: PipelineKind, entity_id: Uuid) -> Result<Vec<HistoryRecord>, AppError> {
        let fk = kind.history_fk();
        let records = sqlx::query_as::<_, HistoryRecord>(&format!(
            r#"
            SELECT id, {fk} AS entity_id, action, from_stage_id, to_stage_id, actor_id, notes, created_at
            FROM {}
            WHERE {fk} = $1
            ORDER BY created_at, id
            "#,
            kind.history_table()
        ))
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Cria a oportunidade sucessora (mesmo contato, responsável, título e valor)
    /// ativa no funil/etapa de destino.
    pub async fn create_successor_opportunity<'e, E>(
        &self,
        executor: E,
        source_id: Uuid,
        target: &SuccessorTarget,
    ) -> Result<PipelineState, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let state = sqlx::query_as::<_, PipelineState>(&format!(
            r#"
            INSERT INTO opportunities (contact_id, owner_id, title, value, funnel_id, stage_id, stage_entered_at)
            SELECT contact_id, owner_id, title, value, $2, $3, NOW()
            FROM opportunities
            WHERE id = $1
            RETURNING {}
            "#,
            state_columns(PipelineKind::Opportunities)
        ))
        .bind(source_id)
        .bind(target.funnel_id)
        .bind(target.stage_id)
        .fetch_one(executor)
        .await?;

        Ok(state)
    }
}
