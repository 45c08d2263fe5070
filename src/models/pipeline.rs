// src/models/pipeline.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "pipeline_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Active,
    Lost,
    Won,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "history_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    StageChange,
    Lost,
    Won,
    Reactivated,
}

/// Os dois tipos de registro que andam pelo funil. Mesmo fluxo, tabelas diferentes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Contacts,
    Opportunities,
}

impl PipelineKind {
    pub fn table(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "contacts",
            PipelineKind::Opportunities => "opportunities",
        }
    }

    pub fn history_table(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "contact_history",
            PipelineKind::Opportunities => "opportunity_history",
        }
    }

    /// Coluna de FK na tabela de histórico
    pub fn history_fk(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "contact_id",
            PipelineKind::Opportunities => "opportunity_id",
        }
    }

    /// Coluna que aponta para o contato (o próprio id no caso de contatos)
    pub fn contact_column(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "id",
            PipelineKind::Opportunities => "contact_id",
        }
    }

    /// Coluna de vínculo em `contracts`
    pub fn contract_fk(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "contact_id",
            PipelineKind::Opportunities => "opportunity_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineKind::Contacts => "Contato",
            PipelineKind::Opportunities => "Oportunidade",
        }
    }
}

// --- Configuração do Funil ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub id: Uuid,
    #[schema(example = "Prospecção")]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub id: Uuid,
    pub funnel_id: Uuid,
    #[schema(example = "Reunião Agendada")]
    pub name: String,
    #[schema(example = 2)]
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// Etapa com o nome do funil, para regras que dependem de nomes.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StageRef {
    pub stage_id: Uuid,
    pub stage_name: String,
    pub funnel_id: Uuid,
    pub funnel_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LostReason {
    pub id: Uuid,
    #[schema(example = "Sem orçamento")]
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// --- Registros ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub owner_id: Uuid,
    #[schema(example = "Maria da Silva")]
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "casado")]
    pub marital_status: Option<String>,
    #[schema(example = "feminino")]
    pub gender: Option<String>,
    #[schema(example = json!(["aposentadoria", "sucessao"]))]
    pub goal_types: Vec<String>,

    pub status: PipelineStatus,
    pub funnel_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub stage_entered_at: Option<DateTime<Utc>>,
    pub lost_reason_id: Option<Uuid>,
    pub lost_at: Option<DateTime<Utc>>,
    pub lost_from_stage_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub owner_id: Uuid,
    #[schema(example = "Previdência privada")]
    pub title: String,
    #[schema(example = "25000.00")]
    pub value: Option<Decimal>,

    pub status: PipelineStatus,
    pub funnel_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub stage_entered_at: Option<DateTime<Utc>>,
    pub lost_reason_id: Option<Uuid>,
    pub lost_at: Option<DateTime<Utc>>,
    pub lost_from_stage_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Os campos de funil de um contato ou oportunidade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub contact_id: Uuid,
    pub status: PipelineStatus,
    pub funnel_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub stage_entered_at: Option<DateTime<Utc>>,
    pub lost_reason_id: Option<Uuid>,
    pub lost_at: Option<DateTime<Utc>>,
    pub lost_from_stage_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Motivo e data de perda existem se e somente se o status é `lost`.
    pub fn is_consistent(&self) -> bool {
        let lost = self.status == PipelineStatus::Lost;
        lost == self.lost_reason_id.is_some() && lost == self.lost_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub action: HistoryAction,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Transições ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("o registro não está ativo (status atual: {0:?})")]
    NotActive(PipelineStatus),
    #[error("o registro não está perdido (status atual: {0:?})")]
    NotLost(PipelineStatus),
    #[error("o registro já está nesta etapa")]
    SameStage,
    #[error("funil e etapa de destino devem ser informados juntos")]
    IncompleteSuccessor,
    #[error("a etapa não pertence ao funil informado")]
    StageOutsideFunnel,
    #[error("contatos não geram sucessor ao serem ganhos")]
    SuccessorNotSupported,
    #[error("o registro foi alterado por outra operação")]
    ConcurrentUpdate,
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::NotActive(_) => "transition_not_active",
            TransitionError::NotLost(_) => "transition_not_lost",
            TransitionError::SameStage => "transition_same_stage",
            TransitionError::IncompleteSuccessor => "transition_incomplete_successor",
            TransitionError::StageOutsideFunnel => "transition_stage_outside_funnel",
            TransitionError::SuccessorNotSupported => "transition_successor_not_supported",
            TransitionError::ConcurrentUpdate => "transition_concurrent_update",
        }
    }

    /// Erros de estado (o registro está no status errado), e não de parâmetro.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TransitionError::NotActive(_) | TransitionError::NotLost(_) | TransitionError::ConcurrentUpdate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance { stage_id: Uuid, funnel_id: Uuid },
    MarkLost { lost_reason_id: Uuid },
    MarkWon,
    Reactivate { stage_id: Uuid, funnel_id: Uuid },
}

impl Transition {
    pub fn action(&self) -> HistoryAction {
        match self {
            Transition::Advance { .. } => HistoryAction::StageChange,
            Transition::MarkLost { .. } => HistoryAction::Lost,
            Transition::MarkWon => HistoryAction::Won,
            Transition::Reactivate { .. } => HistoryAction::Reactivated,
        }
    }

    /// Status que o registro precisa ter para a transição ser aplicada.
    pub fn required_status(&self) -> PipelineStatus {
        match self {
            Transition::Reactivate { .. } => PipelineStatus::Lost,
            _ => PipelineStatus::Active,
        }
    }

    pub fn validate(&self, current: &PipelineState) -> Result<(), TransitionError> {
        if current.status != self.required_status() {
            return Err(match self {
                Transition::Reactivate { .. } => TransitionError::NotLost(current.status),
                _ => TransitionError::NotActive(current.status),
            });
        }

        if let Transition::Advance { stage_id, .. } = self {
            if current.stage_id == Some(*stage_id) {
                return Err(TransitionError::SameStage);
            }
        }

        Ok(())
    }

    /// Calcula o próximo estado. Não toca no banco.
    pub fn apply(&self, current: &PipelineState, now: DateTime<Utc>) -> Result<PipelineState, TransitionError> {
        self.validate(current)?;

        let mut next = current.clone();
        match *self {
            Transition::Advance { stage_id, funnel_id } => {
                next.stage_id = Some(stage_id);
                next.funnel_id = Some(funnel_id);
                next.stage_entered_at = Some(now);
            }
            Transition::MarkLost { lost_reason_id } => {
                next.status = PipelineStatus::Lost;
                next.lost_at = Some(now);
                next.lost_reason_id = Some(lost_reason_id);
                next.lost_from_stage_id = current.stage_id;
            }
            Transition::MarkWon => {
                next.status = PipelineStatus::Won;
                next.converted_at = Some(now);
            }
            Transition::Reactivate { stage_id, funnel_id } => {
                next.status = PipelineStatus::Active;
                next.lost_at = None;
                next.lost_reason_id = None;
                next.lost_from_stage_id = None;
                next.stage_id = Some(stage_id);
                next.funnel_id = Some(funnel_id);
                next.stage_entered_at = Some(now);
            }
        }

        Ok(next)
    }

    /// (etapa de origem, etapa de destino) gravadas no histórico.
    pub fn stage_span(&self, before: &PipelineState) -> (Option<Uuid>, Option<Uuid>) {
        match *self {
            Transition::Advance { stage_id, .. } => (before.stage_id, Some(stage_id)),
            Transition::MarkLost { .. } | Transition::MarkWon => (before.stage_id, None),
            Transition::Reactivate { stage_id, .. } => (before.lost_from_stage_id, Some(stage_id)),
        }
    }
}

/// Destino do registro sucessor criado ao marcar como ganho.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessorTarget {
    pub funnel_id: Uuid,
    pub stage_id: Uuid,
}

impl SuccessorTarget {
    pub fn from_parts(
        kind: PipelineKind,
        next_funnel_id: Option<Uuid>,
        next_stage_id: Option<Uuid>,
    ) -> Result<Option<Self>, TransitionError> {
        match (next_funnel_id, next_stage_id) {
            (None, None) => Ok(None),
            (Some(_), Some(_)) if kind == PipelineKind::Contacts => Err(TransitionError::SuccessorNotSupported),
            (Some(funnel_id), Some(stage_id)) => Ok(Some(Self { funnel_id, stage_id })),
            _ => Err(TransitionError::IncompleteSuccessor),
        }
    }

    pub fn check_stage(&self, stage: &StageRef) -> Result<(), TransitionError> {
        if stage.funnel_id != self.funnel_id {
            return Err(TransitionError::StageOutsideFunnel);
        }
        Ok(())
    }
}

/// Etapa de prospecção cujo "ganho" conclui automaticamente a tarefa de reunião.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WonAutomation {
    pub funnel_name: String,
    pub stage_name: String,
    pub task_type: String,
}

impl WonAutomation {
    pub fn applies_to(&self, stage: &StageRef) -> bool {
        stage.funnel_name.trim().eq_ignore_ascii_case(self.funnel_name.trim())
            && stage.stage_name.trim().eq_ignore_ascii_case(self.stage_name.trim())
    }
}

/// Resultado de uma transição: sucesso, mais avisos de passos dependentes que falharam.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub entity: PipelineState,
    pub history: HistoryRecord,
    pub successor: Option<PipelineState>,
    #[schema(example = json!(["Contrato sem percentual de PB configurado"]))]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn active_at(stage: Uuid) -> PipelineState {
        PipelineState {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            status: PipelineStatus::Active,
            funnel_id: Some(Uuid::new_v4()),
            stage_id: Some(stage),
            stage_entered_at: Some(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()),
            lost_reason_id: None,
            lost_at: None,
            lost_from_stage_id: None,
            converted_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn advance_moves_stage_and_resets_entry_time() {
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let funnel = Uuid::new_v4();
        let state = active_at(from);
        let t = Transition::Advance { stage_id: to, funnel_id: funnel };

        let next = t.apply(&state, now()).unwrap();

        assert_eq!(next.stage_id, Some(to));
        assert_eq!(next.funnel_id, Some(funnel));
        assert_eq!(next.stage_entered_at, Some(now()));
        assert_eq!(next.status, PipelineStatus::Active);
        assert_eq!(t.action(), HistoryAction::StageChange);
        assert_eq!(t.stage_span(&state), (Some(from), Some(to)));
    }

    #[test]
    fn advance_to_current_stage_is_rejected() {
        let stage = Uuid::new_v4();
        let t = Transition::Advance { stage_id: stage, funnel_id: Uuid::new_v4() };
        assert_eq!(t.apply(&active_at(stage), now()), Err(TransitionError::SameStage));
    }

    #[test]
    fn mark_lost_sets_all_lost_fields() {
        let stage = Uuid::new_v4();
        let reason = Uuid::new_v4();
        let state = active_at(stage);

        let next = Transition::MarkLost { lost_reason_id: reason }.apply(&state, now()).unwrap();

        assert_eq!(next.status, PipelineStatus::Lost);
        assert_eq!(next.lost_reason_id, Some(reason));
        assert_eq!(next.lost_at, Some(now()));
        assert_eq!(next.lost_from_stage_id, Some(stage));
        assert!(next.is_consistent());
    }

    #[test]
    fn won_entity_cannot_be_marked_lost() {
        let mut state = active_at(Uuid::new_v4());
        state.status = PipelineStatus::Won;

        let err = Transition::MarkLost { lost_reason_id: Uuid::new_v4() }
            .apply(&state, now())
            .unwrap_err();

        assert_eq!(err, TransitionError::NotActive(PipelineStatus::Won));
        assert!(err.is_conflict());
    }

    #[test]
    fn mark_won_sets_converted_at() {
        let stage = Uuid::new_v4();
        let state = active_at(stage);
        let next = Transition::MarkWon.apply(&state, now()).unwrap();

        assert_eq!(next.status, PipelineStatus::Won);
        assert_eq!(next.converted_at, Some(now()));
        assert!(next.is_consistent());
        assert_eq!(Transition::MarkWon.stage_span(&state), (Some(stage), None));
    }

    #[test]
    fn reactivate_clears_lost_fields_and_sets_new_stage() {
        let old_stage = Uuid::new_v4();
        let lost = Transition::MarkLost { lost_reason_id: Uuid::new_v4() }
            .apply(&active_at(old_stage), now())
            .unwrap();

        let new_stage = Uuid::new_v4();
        let funnel = Uuid::new_v4();
        let later = now() + chrono::Duration::days(3);
        let t = Transition::Reactivate { stage_id: new_stage, funnel_id: funnel };
        let next = t.apply(&lost, later).unwrap();

        assert_eq!(next.status, PipelineStatus::Active);
        assert_eq!(next.lost_at, None);
        assert_eq!(next.lost_reason_id, None);
        assert_eq!(next.lost_from_stage_id, None);
        assert_eq!(next.stage_id, Some(new_stage));
        assert_eq!(next.stage_entered_at, Some(later));
        assert!(next.is_consistent());
        assert_eq!(t.stage_span(&lost), (Some(old_stage), Some(new_stage)));
    }

    #[test]
    fn only_lost_entities_can_be_reactivated() {
        let t = Transition::Reactivate { stage_id: Uuid::new_v4(), funnel_id: Uuid::new_v4() };
        assert_eq!(
            t.apply(&active_at(Uuid::new_v4()), now()),
            Err(TransitionError::NotLost(PipelineStatus::Active))
        );
    }

    #[test]
    fn every_reachable_state_keeps_lost_reason_iff_lost() {
        let reason = Uuid::new_v4();
        let start = active_at(Uuid::new_v4());
        let transitions = [
            Transition::Advance { stage_id: Uuid::new_v4(), funnel_id: Uuid::new_v4() },
            Transition::MarkLost { lost_reason_id: reason },
            Transition::Reactivate { stage_id: Uuid::new_v4(), funnel_id: Uuid::new_v4() },
            Transition::MarkLost { lost_reason_id: reason },
            Transition::Reactivate { stage_id: Uuid::new_v4(), funnel_id: Uuid::new_v4() },
            Transition::MarkWon,
        ];

        let mut state = start;
        assert!(state.is_consistent());
        for t in transitions {
            state = t.apply(&state, now()).unwrap();
            assert!(state.is_consistent(), "estado inconsistente após {:?}", t);
        }
        assert_eq!(state.status, PipelineStatus::Won);
    }

    #[test]
    fn successor_requires_both_funnel_and_stage() {
        let id = Uuid::new_v4();
        let kind = PipelineKind::Opportunities;

        assert_eq!(SuccessorTarget::from_parts(kind, None, None), Ok(None));
        assert_eq!(
            SuccessorTarget::from_parts(kind, Some(id), None),
            Err(TransitionError::IncompleteSuccessor)
        );
        assert_eq!(
            SuccessorTarget::from_parts(PipelineKind::Contacts, Some(id), Some(id)),
            Err(TransitionError::SuccessorNotSupported)
        );
        assert!(SuccessorTarget::from_parts(kind, Some(id), Some(id)).unwrap().is_some());
    }

    #[test]
    fn successor_stage_must_belong_to_funnel() {
        let target = SuccessorTarget { funnel_id: Uuid::new_v4(), stage_id: Uuid::new_v4() };
        let stage = StageRef {
            stage_id: target.stage_id,
            stage_name: "Diagnóstico".into(),
            funnel_id: Uuid::new_v4(),
            funnel_name: "Pós-venda".into(),
        };
        assert_eq!(target.check_stage(&stage), Err(TransitionError::StageOutsideFunnel));
    }

    #[test]
    fn won_automation_matches_funnel_and_stage_names() {
        let automation = WonAutomation {
            funnel_name: "Prospecção".into(),
            stage_name: "Reunião Agendada".into(),
            task_type: "reuniao".into(),
        };
        let mut stage = StageRef {
            stage_id: Uuid::new_v4(),
            stage_name: "Reunião Agendada".into(),
            funnel_id: Uuid::new_v4(),
            funnel_name: "Prospecção".into(),
        };
        assert!(automation.applies_to(&stage));

        stage.stage_name = "Proposta".into();
        assert!(!automation.applies_to(&stage));
    }
}
