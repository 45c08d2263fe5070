// src/services/pipeline_service.rs

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::set_actor_context, error::AppError},
    db::{pipeline_repo::NewContact, ContractRepository, PipelineRepository},
    middleware::acting::Actor,
    models::pipeline::{
        Contact, Funnel, HistoryAction, HistoryRecord, LostReason, Opportunity, PipelineKind,
        PipelineState, PipelineStatus, Stage, StageRef, SuccessorTarget, Transition, TransitionError,
        TransitionOutcome, WonAutomation,
    },
    services::{
        commission::{commission_for, CommissionResult},
        task_service::TaskService,
    },
};

/// Dados de entrada de um contato novo.
pub struct ContactInput {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub marital_status: Option<String>,
    pub gender: Option<String>,
    pub goal_types: Vec<String>,
    pub funnel_id: Uuid,
    pub stage_id: Option<Uuid>,
}

/// Dados de entrada de uma oportunidade nova.
pub struct OpportunityInput {
    pub contact_id: Uuid,
    pub title: String,
    pub value: Option<Decimal>,
    pub funnel_id: Uuid,
    pub stage_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct PipelineService {
    repo: PipelineRepository,
    contract_repo: ContractRepository,
    task_service: TaskService,
    won_automation: WonAutomation,
    pool: PgPool,
}

impl PipelineService {
    pub fn new(
        repo: PipelineRepository,
        contract_repo: ContractRepository,
        task_service: TaskService,
        won_automation: WonAutomation,
        pool: PgPool,
    ) -> Self {
        Self { repo, contract_repo, task_service, won_automation, pool }
    }

    // =========================================================================
    //  CONFIGURAÇÃO DO FUNIL
    // =========================================================================

    pub async fn create_funnel(&self, name: &str) -> Result<Funnel, AppError> {
        self.repo.create_funnel(&self.pool, name.trim()).await
    }

    pub async fn list_funnels(&self) -> Result<Vec<Funnel>, AppError> {
        self.repo.list_funnels().await
    }

    pub async fn create_stage(&self, funnel_id: Uuid, name: &str, position: i32) -> Result<Stage, AppError> {
        self.repo.create_stage(&self.pool, funnel_id, name.trim(), position).await
    }

    pub async fn list_stages(&self, funnel_id: Uuid) -> Result<Vec<Stage>, AppError> {
        self.repo.list_stages(funnel_id).await
    }

    pub async fn create_lost_reason(&self, name: &str) -> Result<LostReason, AppError> {
        self.repo.create_lost_reason(&self.pool, name.trim()).await
    }

    pub async fn list_lost_reasons(&self) -> Result<Vec<LostReason>, AppError> {
        self.repo.list_lost_reasons().await
    }

    // =========================================================================
    //  CADASTRO
    // =========================================================================

    pub async fn create_contact(&self, actor: &Actor, input: ContactInput) -> Result<Contact, AppError> {
        let stage = self.resolve_entry_stage(input.funnel_id, input.stage_id).await?;

        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let contact = self
            .repo
            .create_contact(
                &mut *tx,
                &NewContact {
                    owner_id: actor.effective_user_id(),
                    full_name: input.full_name.trim(),
                    email: input.email.as_deref(),
                    phone: input.phone.as_deref(),
                    marital_status: input.marital_status.as_deref(),
                    gender: input.gender.as_deref(),
                    goal_types: &input.goal_types,
                },
                &stage,
            )
            .await?;

        self.repo
            .insert_history(
                &mut *tx,
                PipelineKind::Contacts,
                contact.id,
                HistoryAction::Created,
                None,
                Some(stage.stage_id),
                actor.user_id,
                None,
            )
            .await?;

        tx.commit().await?;
        Ok(contact)
    }

    pub async fn create_opportunity(&self, actor: &Actor, input: OpportunityInput) -> Result<Opportunity, AppError> {
        let stage = self.resolve_entry_stage(input.funnel_id, input.stage_id).await?;

        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let opportunity = self
            .repo
            .create_opportunity(
                &mut *tx,
                input.contact_id,
                actor.effective_user_id(),
                input.title.trim(),
                input.value,
                &stage,
            )
            .await?;

        self.repo
            .insert_history(
                &mut *tx,
                PipelineKind::Opportunities,
                opportunity.id,
                HistoryAction::Created,
                None,
                Some(stage.stage_id),
                actor.user_id,
                None,
            )
            .await?;

        tx.commit().await?;
        Ok(opportunity)
    }

    pub async fn list_contacts(&self, actor: &Actor, status: Option<PipelineStatus>) -> Result<Vec<Contact>, AppError> {
        self.repo.list_contacts(actor.effective_user_id(), status).await
    }

    pub async fn list_opportunities(
        &self,
        actor: &Actor,
        status: Option<PipelineStatus>,
    ) -> Result<Vec<Opportunity>, AppError> {
        self.repo.list_opportunities(actor.effective_user_id(), status).await
    }

    pub async fn history(&self, kind: PipelineKind, id: Uuid) -> Result<Vec<HistoryRecord>, AppError> {
        self.repo.list_history(kind, id).await
    }

    // =========================================================================
    //  TRANSIÇÕES
    // =========================================================================

    pub async fn move_stage(
        &self,
        actor: &Actor,
        kind: PipelineKind,
        id: Uuid,
        stage_id: Uuid,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        let stage = self.find_stage(stage_id).await?;
        let transition = Transition::Advance { stage_id: stage.stage_id, funnel_id: stage.funnel_id };
        self.apply_transition(actor, kind, id, transition, None, notes).await
    }

    pub async fn mark_lost(
        &self,
        actor: &Actor,
        kind: PipelineKind,
        id: Uuid,
        lost_reason_id: Uuid,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        if !self.repo.lost_reason_exists(&self.pool, lost_reason_id).await? {
            return Err(AppError::ResourceNotFound("Motivo de perda".into()));
        }
        self.apply_transition(actor, kind, id, Transition::MarkLost { lost_reason_id }, None, notes)
            .await
    }

    pub async fn mark_won(
        &self,
        actor: &Actor,
        kind: PipelineKind,
        id: Uuid,
        next_funnel_id: Option<Uuid>,
        next_stage_id: Option<Uuid>,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        let successor = SuccessorTarget::from_parts(kind, next_funnel_id, next_stage_id)?;
        if let Some(target) = &successor {
            target.check_stage(&self.find_stage(target.stage_id).await?)?;
        }

        self.apply_transition(actor, kind, id, Transition::MarkWon, successor, notes)
            .await
    }

    pub async fn reactivate(
        &self,
        actor: &Actor,
        kind: PipelineKind,
        id: Uuid,
        stage_id: Uuid,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        let stage = self.find_stage(stage_id).await?;
        let transition = Transition::Reactivate { stage_id: stage.stage_id, funnel_id: stage.funnel_id };
        self.apply_transition(actor, kind, id, transition, None, notes).await
    }

    /// Trava a linha, aplica a transição, grava histórico (e sucessor) e faz commit.
    /// Depois do commit, no "ganho", roda os passos dependentes.
    async fn apply_transition(
        &self,
        actor: &Actor,
        kind: PipelineKind,
        id: Uuid,
        transition: Transition,
        successor: Option<SuccessorTarget>,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let before = self
            .repo
            .load_state_for_update(&mut tx, kind, id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound(kind.label().into()))?;

        let next = transition.apply(&before, Utc::now())?;
        debug_assert!(next.is_consistent(), "estado inconsistente após {:?}", transition);

        if !self.repo.update_state(&mut tx, kind, &next, transition.required_status()).await? {
            return Err(TransitionError::ConcurrentUpdate.into());
        }

        let (from_stage, to_stage) = transition.stage_span(&before);
        let history = self
            .repo
            .insert_history(&mut *tx, kind, id, transition.action(), from_stage, to_stage, actor.user_id, notes)
            .await?;

        let successor = match successor {
            Some(target) => Some(self.create_successor(&mut tx, actor, id, &target).await?),
            None => None,
        };

        tx.commit().await?;

        tracing::info!(
            entity = kind.label(),
            id = %id,
            action = ?transition.action(),
            actor_id = %actor.user_id,
            "🔀 Transição aplicada"
        );

        let warnings = if transition == Transition::MarkWon {
            self.after_won(actor, kind, &before).await
        } else {
            Vec::new()
        };

        Ok(TransitionOutcome { entity: next, history, successor, warnings })
    }

    async fn create_successor(
        &self,
        conn: &mut sqlx::PgConnection,
        actor: &Actor,
        source_id: Uuid,
        target: &SuccessorTarget,
    ) -> Result<PipelineState, AppError> {
        let created = self.repo.create_successor_opportunity(&mut *conn, source_id, target).await?;

        self.repo
            .insert_history(
                &mut *conn,
                PipelineKind::Opportunities,
                created.id,
                HistoryAction::Created,
                None,
                Some(target.stage_id),
                actor.user_id,
                None,
            )
            .await?;

        Ok(created)
    }

    /// Recalcula PB e conclui a tarefa de prospecção. Falhas viram avisos:
    /// o ganho já está gravado.
    async fn after_won(&self, actor: &Actor, kind: PipelineKind, before: &PipelineState) -> Vec<String> {
        let mut warnings = match self.recalculate_commissions(kind, before.id).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(id = %before.id, "🔥 Falha ao recalcular PB: {}", e);
                vec![format!("Falha ao recalcular PB dos contratos: {}", e)]
            }
        };

        if let Err(e) = self.complete_prospecting_task(actor, before).await {
            tracing::error!(id = %before.id, "🔥 Falha ao concluir tarefa de prospecção: {}", e);
            warnings.push(format!("Falha ao concluir a tarefa de prospecção: {}", e));
        }

        warnings
    }

    async fn recalculate_commissions(&self, kind: PipelineKind, id: Uuid) -> Result<Vec<String>, AppError> {
        let inputs = self.contract_repo.commission_inputs(&self.pool, kind, id).await?;

        let mut warnings = Vec::new();
        for input in &inputs {
            match commission_for(input) {
                CommissionResult::Calculated(pb) => {
                    self.contract_repo.set_calculated_pb(&self.pool, input.contract_id, pb).await?;
                }
                CommissionResult::MissingRate => {
                    tracing::warn!(contract_id = %input.contract_id, "⚠️ Produto sem percentual de PB");
                    warnings.push(format!(
                        "Produto '{}' sem percentual de PB configurado; contrato {} não recalculado",
                        input.product_name, input.contract_id
                    ));
                }
            }
        }

        Ok(warnings)
    }

    async fn complete_prospecting_task(&self, actor: &Actor, before: &PipelineState) -> Result<(), AppError> {
        let Some(stage_id) = before.stage_id else {
            return Ok(());
        };
        let Some(stage) = self.repo.find_stage_ref(&self.pool, stage_id).await? else {
            return Ok(());
        };
        if !self.won_automation.applies_to(&stage) {
            return Ok(());
        }

        let completed = self
            .task_service
            .complete_oldest_open(actor, before.owner_id, before.contact_id, &self.won_automation.task_type)
            .await?;

        if let Some(task) = completed {
            tracing::info!(task_id = %task.id, "🤝 Tarefa de reunião concluída pelo ganho");
        }
        Ok(())
    }

    // =========================================================================
    //  AUXILIARES
    // =========================================================================

    async fn find_stage(&self, stage_id: Uuid) -> Result<StageRef, AppError> {
        self.repo
            .find_stage_ref(&self.pool, stage_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Etapa".into()))
    }

    /// Etapa informada (precisa ser do funil) ou a primeira etapa do funil.
    async fn resolve_entry_stage(&self, funnel_id: Uuid, stage_id: Option<Uuid>) -> Result<StageRef, AppError> {
        match stage_id {
            Some(stage_id) => {
                let stage = self.find_stage(stage_id).await?;
                if stage.funnel_id != funnel_id {
                    return Err(TransitionError::StageOutsideFunnel.into());
                }
                Ok(stage)
            }
            None => self
                .repo
                .first_stage(&self.pool, funnel_id)
                .await?
                .ok_or_else(|| AppError::ResourceNotFound("Etapa inicial do funil".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{contract_repo::NewContract, TaskRepository},
        models::{contracts::BillingStatus, tasks::{NewTask, TaskStatus}},
        testing,
    };
    use chrono::NaiveDate;

    #[sqlx::test]
    async fn won_opportunity_spawns_successor_and_runs_automations(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (user, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let service = &state.pipeline_service;

        let (prospecting, meeting_stage) = testing::funnel(&state, "Prospecção", "Reunião Agendada").await;
        let (after_sales, onboarding) = testing::funnel(&state, "Pós-venda", "Onboarding").await;
        let contact = testing::contact(&state, &actor, prospecting.id, "Maria da Silva").await;

        let opportunity = service
            .create_opportunity(
                &actor,
                OpportunityInput {
                    contact_id: contact.id,
                    title: "Previdência privada".into(),
                    value: Some(Decimal::new(1000, 0)),
                    funnel_id: prospecting.id,
                    stage_id: Some(meeting_stage.id),
                },
            )
            .await
            .unwrap();

        let product = state
            .contract_service
            .create_product("PGBL", "previdencia", Some(Decimal::new(10, 0)))
            .await
            .unwrap();
        let contract = state
            .contract_service
            .create_contract(
                &actor,
                NewContract {
                    contact_id: contact.id,
                    opportunity_id: Some(opportunity.id),
                    product_id: product.id,
                    value: Decimal::new(1000, 0),
                    billing_status: BillingStatus::Paid,
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end_date: None,
                },
            )
            .await
            .unwrap();

        let task_repo = TaskRepository::new(pool.clone());
        let meeting = |title: &str| NewTask {
            created_by: user.id,
            assigned_to: user.id,
            contact_id: Some(contact.id),
            title: title.to_string(),
            description: None,
            task_type: "reuniao".to_string(),
            scheduled_at: Utc::now(),
        };
        let older = task_repo.create_task(&pool, &meeting("Primeira reunião")).await.unwrap();
        let newer = task_repo.create_task(&pool, &meeting("Segunda reunião")).await.unwrap();
        sqlx::query("UPDATE tasks SET created_at = NOW() - INTERVAL '1 day' WHERE id = $1")
            .bind(older.id)
            .execute(&pool)
            .await
            .unwrap();

        let outcome = service
            .mark_won(
                &actor,
                PipelineKind::Opportunities,
                opportunity.id,
                Some(after_sales.id),
                Some(onboarding.id),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.entity.status, PipelineStatus::Won);
        assert!(outcome.entity.converted_at.is_some());
        assert_eq!(outcome.history.action, HistoryAction::Won);
        assert_eq!(outcome.history.from_stage_id, Some(meeting_stage.id));

        let successor = outcome.successor.expect("oportunidade sucessora");
        assert_eq!(successor.status, PipelineStatus::Active);
        assert_eq!(successor.contact_id, contact.id);
        assert_eq!(successor.funnel_id, Some(after_sales.id));
        assert_eq!(successor.stage_id, Some(onboarding.id));

        let actions: Vec<HistoryAction> = service
            .history(PipelineKind::Opportunities, opportunity.id)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.action)
            .collect();
        assert_eq!(actions, vec![HistoryAction::Created, HistoryAction::Won]);

        let successor_history = service.history(PipelineKind::Opportunities, successor.id).await.unwrap();
        assert_eq!(successor_history.len(), 1);
        assert_eq!(successor_history[0].action, HistoryAction::Created);
        assert_eq!(successor_history[0].to_stage_id, Some(onboarding.id));

        let older = task_repo.find_by_id(&pool, older.id).await.unwrap().unwrap();
        let newer = task_repo.find_by_id(&pool, newer.id).await.unwrap().unwrap();
        assert_eq!(older.status, TaskStatus::Completed);
        assert_ne!(newer.status, TaskStatus::Completed);

        let contracts = state.contract_service.list_contracts_for_contact(contact.id).await.unwrap();
        let recalculated = contracts.iter().find(|c| c.id == contract.id).unwrap();
        assert_eq!(recalculated.calculated_pb, Some(Decimal::new(10000, 2)));
    }

    #[sqlx::test]
    async fn history_rows_cannot_be_rewritten(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Prospecção", "Primeiro Contato").await;
        let contact = testing::contact(&state, &actor, funnel.id, "Maria da Silva").await;

        let updated = sqlx::query("UPDATE contact_history SET notes = 'editado' WHERE contact_id = $1")
            .bind(contact.id)
            .execute(&pool)
            .await;
        assert!(updated.is_err());

        let deleted = sqlx::query("DELETE FROM contact_history WHERE contact_id = $1")
            .bind(contact.id)
            .execute(&pool)
            .await;
        assert!(deleted.is_err());
    }

    #[sqlx::test]
    async fn second_win_on_the_same_record_is_rejected(pool: PgPool) {
        let state = testing::state(pool);
        let (_, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Prospecção", "Primeiro Contato").await;
        let contact = testing::contact(&state, &actor, funnel.id, "Maria da Silva").await;
        let service = &state.pipeline_service;

        service
            .mark_won(&actor, PipelineKind::Contacts, contact.id, None, None, None)
            .await
            .unwrap();
        let err = service
            .mark_won(&actor, PipelineKind::Contacts, contact.id, None, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition(TransitionError::NotActive(PipelineStatus::Won))));
        let history = service.history(PipelineKind::Contacts, contact.id).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
