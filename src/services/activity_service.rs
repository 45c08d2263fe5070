// src/services/activity_service.rs

use std::collections::HashMap;

use chrono::{DateTime, Days, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::set_actor_context, error::AppError},
    db::{ActivityRepository, TaskRepository, UserRepository},
    middleware::acting::Actor,
    models::{
        activities::{
            ActivityRunReport, CriticalActivity, MatchPreview, RuleConfig, RuleMatch, RuleType,
            TriggerDecision,
        },
        tasks::{NewTask, CRITICAL_ACTIVITY_TASK_TYPE},
    },
    services::rules,
};

/// Dados de uma regra nova, já validados no handler.
pub struct NewActivity {
    pub title: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub rule_config: Value,
    pub is_perpetual: bool,
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Clone)]
pub struct ActivityService {
    activity_repo: ActivityRepository,
    task_repo: TaskRepository,
    user_repo: UserRepository,
    pool: PgPool,
}

impl ActivityService {
    pub fn new(
        activity_repo: ActivityRepository,
        task_repo: TaskRepository,
        user_repo: UserRepository,
        pool: PgPool,
    ) -> Self {
        Self { activity_repo, task_repo, user_repo, pool }
    }

    // =========================================================================
    //  CADASTRO DE REGRAS
    // =========================================================================

    pub async fn create_activity(&self, actor: &Actor, new: NewActivity) -> Result<CriticalActivity, AppError> {
        // Config inválida nunca chega ao banco
        let config = RuleConfig::parse(new.rule_type, &new.rule_config)?;

        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let activity = self
            .activity_repo
            .create_activity(
                &mut *tx,
                &new.title,
                new.description.as_deref(),
                config.rule_type(),
                &config.to_json(),
                new.is_perpetual,
                actor.effective_user_id(),
            )
            .await?;

        if !new.assignee_ids.is_empty() {
            self.activity_repo
                .replace_assignments(&mut tx, activity.id, &new.assignee_ids)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(activity_id = %activity.id, rule_type = ?activity.rule_type, "📋 Atividade crítica criada");
        Ok(activity)
    }

    pub async fn list_activities(&self) -> Result<Vec<CriticalActivity>, AppError> {
        self.activity_repo.list_activities().await
    }

    pub async fn get_activity(&self, id: Uuid) -> Result<CriticalActivity, AppError> {
        self.activity_repo
            .find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Atividade crítica".into()))
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<CriticalActivity, AppError> {
        self.activity_repo
            .set_active(&self.pool, id, is_active)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Atividade crítica".into()))
    }

    pub async fn replace_assignments(&self, id: Uuid, user_ids: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        self.get_activity(id).await?;

        let mut tx = self.pool.begin().await?;
        self.activity_repo.replace_assignments(&mut tx, id, user_ids).await?;
        tx.commit().await?;

        self.activity_repo.list_assignees(&self.pool, id).await
    }

    // =========================================================================
    //  AVALIAÇÃO
    // =========================================================================

    /// Avalia todas as regras ativas e perpétuas. Uma regra com erro não
    /// interrompe as demais; o erro vai no relatório dela.
    pub async fn evaluate_all(&self, actor: &Actor) -> Result<Vec<ActivityRunReport>, AppError> {
        let activities = self.activity_repo.list_active_perpetual().await?;
        tracing::info!("🔎 Avaliando {} atividades críticas", activities.len());

        let mut reports = Vec::with_capacity(activities.len());
        for activity in activities {
            let report = match self.run_rule(actor, &activity, Utc::now()).await {
                Ok(tasks_created) => ActivityRunReport {
                    activity_id: activity.id,
                    title: activity.title,
                    tasks_created,
                    error: None,
                },
                Err(e) => {
                    tracing::error!(activity_id = %activity.id, "🔥 Falha ao avaliar atividade: {}", e);
                    ActivityRunReport {
                        activity_id: activity.id,
                        title: activity.title,
                        tasks_created: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }

    /// Avalia uma regra específica (mesmo não perpétua). Regra inativa é erro.
    pub async fn evaluate_single(&self, actor: &Actor, id: Uuid) -> Result<u32, AppError> {
        let activity = self.get_activity(id).await?;
        if !activity.is_active {
            return Err(AppError::ActivityInactive);
        }

        self.run_rule(actor, &activity, Utc::now()).await
    }

    /// O que a próxima rodada faria com esta regra, sem gravar nada.
    pub async fn preview(&self, id: Uuid) -> Result<Vec<MatchPreview>, AppError> {
        let activity = self.get_activity(id).await?;
        let config = activity.config()?;

        let Some(matches) = self.collect_matches(&activity, &config, Utc::now()).await? else {
            return Ok(Vec::new());
        };

        let triggers = self.activity_repo.list_triggers(activity.id).await?;
        let by_key: HashMap<_, _> = triggers.iter().map(|t| ((t.user_id, t.contact_id), t)).collect();

        Ok(matches
            .into_iter()
            .map(|rule_match| {
                let decision = TriggerDecision::for_existing(by_key.get(&rule_match.key()).copied());
                MatchPreview { rule_match, decision }
            })
            .collect())
    }

    /// Uma passada de uma regra. Retorna quantas tarefas foram criadas.
    async fn run_rule(&self, actor: &Actor, activity: &CriticalActivity, now: DateTime<Utc>) -> Result<u32, AppError> {
        let config = activity.config()?;

        let Some(matches) = self.collect_matches(activity, &config, now).await? else {
            tracing::debug!(activity_id = %activity.id, "⏭️ Recorrência ainda não venceu");
            return Ok(0);
        };

        let mut created = 0;
        for rule_match in &matches {
            if self.claim_and_create_task(actor, activity, rule_match, now).await? {
                created += 1;
            }
        }

        self.activity_repo.touch_last_run(&self.pool, activity.id, now).await?;

        tracing::info!(
            activity_id = %activity.id,
            matches = matches.len(),
            tasks_created = created,
            "✅ Atividade avaliada"
        );
        Ok(created)
    }

    /// Gatilho + tarefa + vínculo numa transação. `false` quando já havia gatilho aberto.
    async fn claim_and_create_task(
        &self,
        actor: &Actor,
        activity: &CriticalActivity,
        rule_match: &RuleMatch,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let Some(trigger) = self
            .activity_repo
            .claim_trigger(&mut *tx, activity.id, rule_match.assignee_id, rule_match.contact_id)
            .await?
        else {
            return Ok(false);
        };

        let task = self
            .task_repo
            .create_task(
                &mut *tx,
                &NewTask {
                    created_by: activity.created_by,
                    assigned_to: rule_match.assignee_id,
                    contact_id: rule_match.contact_id,
                    title: rules::task_title(activity, rule_match),
                    description: rules::task_description(activity, rule_match),
                    task_type: CRITICAL_ACTIVITY_TASK_TYPE.to_string(),
                    scheduled_at: now,
                },
            )
            .await?;

        self.activity_repo.link_trigger_task(&mut *tx, trigger.id, task.id).await?;
        tx.commit().await?;

        tracing::debug!(trigger_id = %trigger.id, task_id = %task.id, "📌 Tarefa criada para gatilho");
        Ok(true)
    }

    /// Matches da regra, já filtrados pelas atribuições.
    /// `None` quando a recorrência manual ainda não venceu.
    async fn collect_matches(
        &self,
        activity: &CriticalActivity,
        config: &RuleConfig,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RuleMatch>>, AppError> {
        let assignees = self.activity_repo.list_assignees(&self.pool, activity.id).await?;

        let matches = match config {
            RuleConfig::OverduePayment => {
                rules::contact_matches(self.activity_repo.overdue_payment_matches().await?)
            }
            RuleConfig::LowHealthScore(c) => {
                rules::contact_matches(self.activity_repo.low_health_score_matches(c.threshold).await?)
            }
            RuleConfig::ExpiringContract(c) => {
                let today = now.date_naive();
                let until = today
                    .checked_add_days(Days::new(c.days_before.unsigned_abs()))
                    .ok_or_else(|| AppError::InvalidRuleConfig("days_before fora do intervalo".into()))?;
                rules::contact_matches(
                    self.activity_repo
                        .expiring_contract_matches(&c.product_category, today, until)
                        .await?,
                )
            }
            RuleConfig::CharacteristicMatch(c) => {
                let profiles = self.activity_repo.contact_profiles().await?;
                rules::group_by_owner(profiles.iter().filter(|p| rules::characteristic_matches(c, p)))
            }
            RuleConfig::ManualRecurrence(c) => {
                if !c.interval.is_due(activity.last_run_at, now) {
                    return Ok(None);
                }
                let active_users = if assignees.is_empty() {
                    self.user_repo.list_active_user_ids(&self.pool).await?
                } else {
                    Vec::new()
                };
                return Ok(Some(rules::recurrence_matches(&assignees, &active_users)));
            }
        };

        Ok(Some(rules::restrict_to_assignees(matches, &assignees)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppState,
        db::contract_repo::NewContract,
        models::{contracts::BillingStatus, tasks::TaskStatus},
        testing,
    };
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    async fn rule(state: &AppState, actor: &Actor, rule_type: RuleType, config: Value) -> CriticalActivity {
        state
            .activity_service
            .create_activity(
                actor,
                NewActivity {
                    title: format!("Regra {:?}", rule_type),
                    description: None,
                    rule_type,
                    rule_config: config,
                    is_perpetual: true,
                    assignee_ids: vec![],
                },
            )
            .await
            .unwrap()
    }

    async fn open_triggers(pool: &PgPool, activity_id: Uuid) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM perpetual_activity_triggers WHERE activity_id = $1 AND resolved_at IS NULL",
        )
        .bind(activity_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    async fn low_health_score_creates_one_task_until_it_is_completed(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Prospecção", "Primeiro Contato").await;
        let contact = testing::contact(&state, &actor, funnel.id, "Maria da Silva").await;
        state.contract_service.record_health_score(contact.id, 35).await.unwrap();

        let activity = rule(&state, &actor, RuleType::LowHealthScore, json!({"threshold": 40})).await;
        let service = &state.activity_service;

        assert_eq!(service.evaluate_single(&actor, activity.id).await.unwrap(), 1);
        assert_eq!(service.evaluate_single(&actor, activity.id).await.unwrap(), 0);

        let tasks = state.task_service.list_tasks(&actor, None).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].contact_id, Some(contact.id));
        assert_eq!(tasks[0].title, "Regra LowHealthScore: Maria da Silva");

        state.task_service.complete_task(&actor, tasks[0].id).await.unwrap();
        assert_eq!(open_triggers(&pool, activity.id).await, 0);

        assert_eq!(service.evaluate_single(&actor, activity.id).await.unwrap(), 1);
        assert_eq!(open_triggers(&pool, activity.id).await, 1);

        let open = state
            .task_service
            .list_tasks(&actor, Some(TaskStatus::Pending))
            .await
            .unwrap();
        let overdue = state
            .task_service
            .list_tasks(&actor, Some(TaskStatus::Overdue))
            .await
            .unwrap();
        assert_eq!(open.len() + overdue.len(), 1);
    }

    #[sqlx::test]
    async fn completing_a_completed_task_keeps_it_unchanged(pool: PgPool) {
        let state = testing::state(pool);
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let activity = rule(&state, &actor, RuleType::ManualRecurrence, json!({"interval": "daily"})).await;
        state.activity_service.evaluate_single(&actor, activity.id).await.unwrap();

        let task = state.task_service.list_tasks(&actor, None).await.unwrap().remove(0);
        let first = state.task_service.complete_task(&actor, task.id).await.unwrap();
        let second = state.task_service.complete_task(&actor, task.id).await.unwrap();

        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(second.completed_at, first.completed_at);
    }

    #[sqlx::test]
    async fn concurrent_evaluations_leave_a_single_open_task(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Prospecção", "Primeiro Contato").await;
        let contact = testing::contact(&state, &actor, funnel.id, "Maria da Silva").await;
        state.contract_service.record_health_score(contact.id, 20).await.unwrap();
        let activity = rule(&state, &actor, RuleType::LowHealthScore, json!({"threshold": 40})).await;

        let service = &state.activity_service;
        let (a, b) = tokio::join!(
            service.evaluate_single(&actor, activity.id),
            service.evaluate_single(&actor, activity.id)
        );

        assert_eq!(a.unwrap() + b.unwrap(), 1);
        assert_eq!(open_triggers(&pool, activity.id).await, 1);
        assert_eq!(state.task_service.list_tasks(&actor, None).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    async fn broken_rule_does_not_stop_the_batch(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let broken = rule(&state, &actor, RuleType::LowHealthScore, json!({"threshold": 40})).await;
        let recurring = rule(&state, &actor, RuleType::ManualRecurrence, json!({"interval": "weekly"})).await;

        // Config gravada por fora da API, sem o limite obrigatório
        sqlx::query("UPDATE critical_activities SET rule_config = '{}' WHERE id = $1")
            .bind(broken.id)
            .execute(&pool)
            .await
            .unwrap();

        let reports = state.activity_service.evaluate_all(&actor).await.unwrap();

        assert_eq!(reports.len(), 2);
        let failed = reports.iter().find(|r| r.activity_id == broken.id).unwrap();
        assert_eq!(failed.tasks_created, 0);
        assert!(failed.error.is_some());

        let ok = reports.iter().find(|r| r.activity_id == recurring.id).unwrap();
        assert_eq!(ok.tasks_created, 1);
        assert!(ok.error.is_none());
    }

    #[sqlx::test]
    async fn overdue_payment_matches_only_delinquent_contracts(pool: PgPool) {
        let state = testing::state(pool);
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Clientes", "Carteira").await;
        let late = testing::contact(&state, &actor, funnel.id, "Cliente Atrasado").await;
        let canceled = testing::contact(&state, &actor, funnel.id, "Cliente Cancelado").await;
        let paying = testing::contact(&state, &actor, funnel.id, "Cliente Em Dia").await;
        let product = state
            .contract_service
            .create_product("Previdência Privada", "previdencia", Some(Decimal::new(10, 0)))
            .await
            .unwrap();

        for (contact_id, billing_status) in [
            (late.id, BillingStatus::Overdue),
            (canceled.id, BillingStatus::Canceled),
            (paying.id, BillingStatus::Paid),
        ] {
            state
                .contract_service
                .create_contract(
                    &actor,
                    NewContract {
                        contact_id,
                        opportunity_id: None,
                        product_id: product.id,
                        value: Decimal::new(1000, 0),
                        billing_status,
                        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        end_date: None,
                    },
                )
                .await
                .unwrap();
        }

        let activity = rule(&state, &actor, RuleType::OverduePayment, json!({})).await;
        let preview = state.activity_service.preview(activity.id).await.unwrap();

        let mut matched: Vec<Uuid> = preview.iter().filter_map(|p| p.rule_match.contact_id).collect();
        matched.sort();
        let mut expected = vec![late.id, canceled.id];
        expected.sort();
        assert_eq!(matched, expected);
        assert!(preview.iter().all(|p| p.decision == TriggerDecision::Create));
    }
}
