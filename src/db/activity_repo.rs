// src/db/activity_repo.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{types::Json, Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        activities::{ActivityTrigger, ContactOwnerRow, ContactProfile, CriticalActivity, RuleType},
        contracts::BillingStatus,
    },
};

const ACTIVITY_COLUMNS: &str = "id, title, description, rule_type, rule_config, is_perpetual, \
     is_active, last_run_at, created_by, created_at, updated_at";

const TRIGGER_COLUMNS: &str =
    "id, activity_id, user_id, contact_id, task_id, triggered_at, resolved_at";

#[derive(Clone)]
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  REGRAS (critical_activities)
    // =========================================================================

    pub async fn create_activity<'e, E>(
        &self,
        executor: E,
        title: &str,
        description: Option<&str>,
        rule_type: RuleType,
        rule_config: &Value,
        is_perpetual: bool,
        created_by: Uuid,
    ) -> Result<CriticalActivity, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let activity = sqlx::query_as::<_, CriticalActivity>(&format!(
            r#"
            INSERT INTO critical_activities (title, description, rule_type, rule_config, is_perpetual, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(title)
        .bind(description)
        .bind(rule_type)
        .bind(Json(rule_config))
        .bind(is_perpetual)
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(activity)
    }

    pub async fn list_activities(&self) -> Result<Vec<CriticalActivity>, AppError> {
        let activities = sqlx::query_as::<_, CriticalActivity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM critical_activities ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<CriticalActivity>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let activity = sqlx::query_as::<_, CriticalActivity>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM critical_activities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(activity)
    }

    /// Regras avaliadas pela rodada em lote.
    pub async fn list_active_perpetual(&self) -> Result<Vec<CriticalActivity>, AppError> {
        let activities = sqlx::query_as::<_, CriticalActivity>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM critical_activities
            WHERE is_active = TRUE AND is_perpetual = TRUE
            ORDER BY created_at
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    pub async fn set_active<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<CriticalActivity>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let activity = sqlx::query_as::<_, CriticalActivity>(&format!(
            r#"
            UPDATE critical_activities
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(executor)
        .await?;

        Ok(activity)
    }

    pub async fn touch_last_run<'e, E>(&self, executor: E, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE critical_activities SET last_run_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(executor)
            .await?;

        Ok(())
    }

    // =========================================================================
    //  ATRIBUIÇÕES
    // =========================================================================

    /// Substitui a lista de responsáveis da regra.
    pub async fn replace_assignments(
        &self,
        conn: &mut sqlx::PgConnection,
        activity_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM critical_activity_assignments WHERE activity_id = $1")
            .bind(activity_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO critical_activity_assignments (activity_id, user_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(activity_id)
        .bind(user_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_foreign_key_violation() {
                    return AppError::UserNotFound;
                }
            }
            e.into()
        })?;

        Ok(())
    }

    pub async fn list_assignees<'e, E>(&self, executor: E, activity_id: Uuid) -> Result<Vec<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT a.user_id
            FROM critical_activity_assignments a
            JOIN users u ON u.id = a.user_id
            WHERE a.activity_id = $1 AND u.is_active = TRUE
            ORDER BY a.created_at
            "#,
        )
        .bind(activity_id)
        .fetch_all(executor)
        .await?;

        Ok(ids)
    }

    // =========================================================================
    //  GATILHOS (perpetual_activity_triggers)
    // =========================================================================

    /// Insert-if-absent atômico. Devolve a linha quando o gatilho foi criado
    /// ou re-armado (estava resolvido); `None` quando já existe um gatilho aberto.
    pub async fn claim_trigger<'e, E>(
        &self,
        executor: E,
        activity_id: Uuid,
        user_id: Uuid,
        contact_id: Option<Uuid>,
    ) -> Result<Option<ActivityTrigger>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let trigger = sqlx::query_as::<_, ActivityTrigger>(&format!(
            r#"
            INSERT INTO perpetual_activity_triggers (activity_id, user_id, contact_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (activity_id, user_id, contact_key) DO UPDATE
                SET triggered_at = NOW(), resolved_at = NULL, task_id = NULL
                WHERE perpetual_activity_triggers.resolved_at IS NOT NULL
            RETURNING {TRIGGER_COLUMNS}
            "#
        ))
        .bind(activity_id)
        .bind(user_id)
        .bind(contact_id)
        .fetch_optional(executor)
        .await?;

        Ok(trigger)
    }

    pub async fn link_trigger_task<'e, E>(&self, executor: E, trigger_id: Uuid, task_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE perpetual_activity_triggers SET task_id = $2 WHERE id = $1")
            .bind(trigger_id)
            .bind(task_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn list_triggers(&self, activity_id: Uuid) -> Result<Vec<ActivityTrigger>, AppError> {
        let triggers = sqlx::query_as::<_, ActivityTrigger>(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM perpetual_activity_triggers WHERE activity_id = $1"
        ))
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(triggers)
    }

    /// Fecha o gatilho aberto ligado à tarefa (se houver).
    pub async fn resolve_trigger_for_task<'e, E>(&self, executor: E, task_id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE perpetual_activity_triggers
            SET resolved_at = NOW()
            WHERE task_id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(task_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  PREDICADOS (quem casa com cada tipo de regra)
    // =========================================================================

    /// Contatos com contrato ativo e cobrança atrasada ou cancelada.
    pub async fn overdue_payment_matches(&self) -> Result<Vec<ContactOwnerRow>, AppError> {
        let rows = sqlx::query_as::<_, ContactOwnerRow>(
            r#"
            SELECT DISTINCT ON (c.id)
                c.id AS contact_id, c.owner_id, c.full_name,
                p.name AS detail
            FROM contracts k
            JOIN contacts c ON c.id = k.contact_id
            JOIN products p ON p.id = k.product_id
            WHERE k.status = 'active'
              AND k.billing_status::text = ANY($1)
            ORDER BY c.id, k.created_at
            "#,
        )
        .bind(BillingStatus::delinquent_labels())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Contatos cujo snapshot mais recente está abaixo do limite.
    pub async fn low_health_score_matches(&self, threshold: i32) -> Result<Vec<ContactOwnerRow>, AppError> {
        let rows = sqlx::query_as::<_, ContactOwnerRow>(
            r#"
            SELECT c.id AS contact_id, c.owner_id, c.full_name,
                   ('Health score atual: ' || s.score) AS detail
            FROM (
                SELECT DISTINCT ON (contact_id) contact_id, score
                FROM health_score_snapshots
                ORDER BY contact_id, calculated_at DESC
            ) s
            JOIN contacts c ON c.id = s.contact_id
            WHERE s.score < $1
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Contratos ativos da categoria com vencimento em [from, until].
    pub async fn expiring_contract_matches(
        &self,
        product_category: &str,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<ContactOwnerRow>, AppError> {
        let rows = sqlx::query_as::<_, ContactOwnerRow>(
            r#"
            SELECT DISTINCT ON (c.id)
                c.id AS contact_id, c.owner_id, c.full_name,
                (p.name || ' vence em ' || to_char(k.end_date, 'DD/MM/YYYY')) AS detail
            FROM contracts k
            JOIN contacts c ON c.id = k.contact_id
            JOIN products p ON p.id = k.product_id
            WHERE k.status = 'active'
              AND lower(p.category) = lower($1)
              AND k.end_date BETWEEN $2 AND $3
            ORDER BY c.id, k.end_date
            "#,
        )
        .bind(product_category)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Perfil de todos os contatos, com os produtos dos contratos ativos.
    pub async fn contact_profiles(&self) -> Result<Vec<ContactProfile>, AppError> {
        let rows = sqlx::query_as::<_, ContactProfile>(
            r#"
            SELECT c.id AS contact_id, c.owner_id, c.full_name,
                   c.marital_status, c.gender, c.goal_types,
                   COALESCE(
                       array_agg(DISTINCT k.product_id) FILTER (WHERE k.id IS NOT NULL),
                       '{}'
                   ) AS product_ids
            FROM contacts c
            LEFT JOIN contracts k ON k.contact_id = c.id AND k.status = 'active'
            GROUP BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
