// src/handlers/pipeline.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        acting::Actor,
        i18n::Locale,
        rbac::{PermPipelineWrite, RequirePermission},
    },
    models::pipeline::{
        Contact, Funnel, HistoryRecord, LostReason, Opportunity, PipelineKind, PipelineStatus, Stage,
        TransitionOutcome,
    },
    services::pipeline_service::{ContactInput, OpportunityInput},
};

// =============================================================================
//  PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamePayload {
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "Prospecção")]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStagePayload {
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "Reunião Agendada")]
    pub name: String,
    #[validate(range(min = 0, message = "invalid_position"))]
    #[schema(example = 2)]
    pub position: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactPayload {
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "Maria da Silva")]
    pub full_name: String,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "casado")]
    pub marital_status: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub goal_types: Vec<String>,
    pub funnel_id: Uuid,
    /// Primeira etapa do funil quando omitido
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOpportunityPayload {
    pub contact_id: Uuid,
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "Previdência privada")]
    pub title: String,
    #[schema(value_type = Option<String>, example = "25000.00")]
    pub value: Option<Decimal>,
    pub funnel_id: Uuid,
    pub stage_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveStagePayload {
    pub stage_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkLostPayload {
    pub lost_reason_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkWonPayload {
    /// Informar junto com `nextStageId` para criar a oportunidade sucessora
    pub next_funnel_id: Option<Uuid>,
    pub next_stage_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusFilter {
    /// active | lost | won
    pub status: Option<PipelineStatus>,
}

fn validate_payload<T: Validate>(payload: &T, app_state: &AppState, locale: &Locale) -> Result<(), ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(locale, &app_state.i18n_store))
}

// Campo obrigatório ausente vira erro de validação, como os do `validator`
fn required(value: Option<Uuid>, field: &'static str) -> Result<Uuid, AppError> {
    value.ok_or_else(|| {
        let mut errors = ValidationErrors::new();
        errors.add(field, ValidationError::new("required"));
        AppError::ValidationError(errors)
    })
}

// =============================================================================
//  ÁREA 1: FUNIS, ETAPAS E MOTIVOS DE PERDA
// =============================================================================

// POST /api/funnels
#[utoipa::path(
    post,
    path = "/api/funnels",
    tag = "Funil",
    request_body = NamePayload,
    responses((status = 201, description = "Funil criado", body = Funnel)),
    security(("api_jwt" = []))
)]
pub async fn create_funnel(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    locale: Locale,
    Json(payload): Json<NamePayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload, &app_state, &locale)?;

    let funnel = app_state
        .pipeline_service
        .create_funnel(&payload.name)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(funnel)))
}

// GET /api/funnels
#[utoipa::path(
    get,
    path = "/api/funnels",
    tag = "Funil",
    responses((status = 200, description = "Funis", body = Vec<Funnel>)),
    security(("api_jwt" = []))
)]
pub async fn list_funnels(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let funnels = app_state
        .pipeline_service
        .list_funnels()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(funnels))
}

// POST /api/funnels/{id}/stages
#[utoipa::path(
    post,
    path = "/api/funnels/{id}/stages",
    tag = "Funil",
    request_body = CreateStagePayload,
    params(("id" = Uuid, Path, description = "ID do funil")),
    responses(
        (status = 201, description = "Etapa criada", body = Stage),
        (status = 404, description = "Funil não encontrado"),
        (status = 409, description = "Já existe etapa com esse nome no funil")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_stage(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    locale: Locale,
    Path(funnel_id): Path<Uuid>,
    Json(payload): Json<CreateStagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload, &app_state, &locale)?;

    let stage = app_state
        .pipeline_service
        .create_stage(funnel_id, &payload.name, payload.position)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(stage)))
}

// GET /api/funnels/{id}/stages
#[utoipa::path(
    get,
    path = "/api/funnels/{id}/stages",
    tag = "Funil",
    params(("id" = Uuid, Path, description = "ID do funil")),
    responses((status = 200, description = "Etapas em ordem", body = Vec<Stage>)),
    security(("api_jwt" = []))
)]
pub async fn list_stages(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(funnel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let stages = app_state
        .pipeline_service
        .list_stages(funnel_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(stages))
}

// POST /api/lost-reasons
#[utoipa::path(
    post,
    path = "/api/lost-reasons",
    tag = "Funil",
    request_body = NamePayload,
    responses((status = 201, description = "Motivo criado", body = LostReason)),
    security(("api_jwt" = []))
)]
pub async fn create_lost_reason(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    locale: Locale,
    Json(payload): Json<NamePayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload, &app_state, &locale)?;

    let reason = app_state
        .pipeline_service
        .create_lost_reason(&payload.name)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(reason)))
}

// GET /api/lost-reasons
#[utoipa::path(
    get,
    path = "/api/lost-reasons",
    tag = "Funil",
    responses((status = 200, description = "Motivos ativos", body = Vec<LostReason>)),
    security(("api_jwt" = []))
)]
pub async fn list_lost_reasons(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let reasons = app_state
        .pipeline_service
        .list_lost_reasons()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(reasons))
}

// =============================================================================
//  ÁREA 2: CONTATOS E OPORTUNIDADES
// =============================================================================

// POST /api/contacts
#[utoipa::path(
    post,
    path = "/api/contacts",
    tag = "Funil",
    request_body = CreateContactPayload,
    responses(
        (status = 201, description = "Contato criado (histórico 'created')", body = Contact),
        (status = 404, description = "Funil sem etapas ou etapa inexistente")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_contact(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Json(payload): Json<CreateContactPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload, &app_state, &locale)?;

    let contact = app_state
        .pipeline_service
        .create_contact(
            &actor,
            ContactInput {
                full_name: payload.full_name,
                email: payload.email,
                phone: payload.phone,
                marital_status: payload.marital_status,
                gender: payload.gender,
                goal_types: payload.goal_types,
                funnel_id: payload.funnel_id,
                stage_id: payload.stage_id,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(contact)))
}

// GET /api/contacts
#[utoipa::path(
    get,
    path = "/api/contacts",
    tag = "Funil",
    params(StatusFilter),
    responses((status = 200, description = "Contatos do usuário efetivo", body = Vec<Contact>)),
    security(("api_jwt" = []))
)]
pub async fn list_contacts(
    State(app_state): State<AppState>,
    actor: Actor,
    locale: Locale,
    Query(filter): Query<StatusFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let contacts = app_state
        .pipeline_service
        .list_contacts(&actor, filter.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(contacts))
}

// POST /api/opportunities
#[utoipa::path(
    post,
    path = "/api/opportunities",
    tag = "Funil",
    request_body = CreateOpportunityPayload,
    responses(
        (status = 201, description = "Oportunidade criada (histórico 'created')", body = Opportunity),
        (status = 404, description = "Contato ou etapa inexistente")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_opportunity(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Json(payload): Json<CreateOpportunityPayload>,
) -> Result<impl IntoResponse, ApiError> {
    validate_payload(&payload, &app_state, &locale)?;

    let opportunity = app_state
        .pipeline_service
        .create_opportunity(
            &actor,
            OpportunityInput {
                contact_id: payload.contact_id,
                title: payload.title,
                value: payload.value,
                funnel_id: payload.funnel_id,
                stage_id: payload.stage_id,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(opportunity)))
}

// GET /api/opportunities
#[utoipa::path(
    get,
    path = "/api/opportunities",
    tag = "Funil",
    params(StatusFilter),
    responses((status = 200, description = "Oportunidades do usuário efetivo", body = Vec<Opportunity>)),
    security(("api_jwt" = []))
)]
pub async fn list_opportunities(
    State(app_state): State<AppState>,
    actor: Actor,
    locale: Locale,
    Query(filter): Query<StatusFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let opportunities = app_state
        .pipeline_service
        .list_opportunities(&actor, filter.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(opportunities))
}

// =============================================================================
//  ÁREA 3: TRANSIÇÕES (contacts | opportunities)
// =============================================================================

// POST /api/pipeline/{kind}/{id}/move
#[utoipa::path(
    post,
    path = "/api/pipeline/{kind}/{id}/move",
    tag = "Funil",
    request_body = MoveStagePayload,
    params(
        ("kind" = PipelineKind, Path, description = "contacts | opportunities"),
        ("id" = Uuid, Path, description = "ID do registro")
    ),
    responses(
        (status = 200, description = "Etapa alterada", body = TransitionOutcome),
        (status = 400, description = "Mesma etapa ou dados inválidos"),
        (status = 409, description = "Registro não está ativo")
    ),
    security(("api_jwt" = []))
)]
pub async fn move_stage(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
    Json(payload): Json<MoveStagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let stage_id = required(payload.stage_id, "stageId")
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .pipeline_service
        .move_stage(&actor, kind, id, stage_id, payload.notes.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(outcome))
}

// POST /api/pipeline/{kind}/{id}/lost
#[utoipa::path(
    post,
    path = "/api/pipeline/{kind}/{id}/lost",
    tag = "Funil",
    request_body = MarkLostPayload,
    params(
        ("kind" = PipelineKind, Path, description = "contacts | opportunities"),
        ("id" = Uuid, Path, description = "ID do registro")
    ),
    responses(
        (status = 200, description = "Marcado como perdido", body = TransitionOutcome),
        (status = 404, description = "Motivo de perda inexistente"),
        (status = 409, description = "Registro não está ativo")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_lost(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
    Json(payload): Json<MarkLostPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let lost_reason_id = required(payload.lost_reason_id, "lostReasonId")
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .pipeline_service
        .mark_lost(&actor, kind, id, lost_reason_id, payload.notes.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(outcome))
}

// POST /api/pipeline/{kind}/{id}/won
#[utoipa::path(
    post,
    path = "/api/pipeline/{kind}/{id}/won",
    tag = "Funil",
    request_body = MarkWonPayload,
    params(
        ("kind" = PipelineKind, Path, description = "contacts | opportunities"),
        ("id" = Uuid, Path, description = "ID do registro")
    ),
    responses(
        (status = 200, description = "Marcado como ganho (avisos em `warnings`)", body = TransitionOutcome),
        (status = 400, description = "Sucessor incompleto ou etapa fora do funil"),
        (status = 409, description = "Registro não está ativo")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_won(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
    Json(payload): Json<MarkWonPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = app_state
        .pipeline_service
        .mark_won(
            &actor,
            kind,
            id,
            payload.next_funnel_id,
            payload.next_stage_id,
            payload.notes.as_deref(),
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(outcome))
}

// POST /api/pipeline/{kind}/{id}/reactivate
#[utoipa::path(
    post,
    path = "/api/pipeline/{kind}/{id}/reactivate",
    tag = "Funil",
    request_body = MoveStagePayload,
    params(
        ("kind" = PipelineKind, Path, description = "contacts | opportunities"),
        ("id" = Uuid, Path, description = "ID do registro")
    ),
    responses(
        (status = 200, description = "Reativado", body = TransitionOutcome),
        (status = 409, description = "Registro não está perdido")
    ),
    security(("api_jwt" = []))
)]
pub async fn reactivate(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermPipelineWrite>,
    actor: Actor,
    locale: Locale,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
    Json(payload): Json<MoveStagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let stage_id = required(payload.stage_id, "stageId")
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .pipeline_service
        .reactivate(&actor, kind, id, stage_id, payload.notes.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(outcome))
}

// GET /api/pipeline/{kind}/{id}/history
#[utoipa::path(
    get,
    path = "/api/pipeline/{kind}/{id}/history",
    tag = "Funil",
    params(
        ("kind" = PipelineKind, Path, description = "contacts | opportunities"),
        ("id" = Uuid, Path, description = "ID do registro")
    ),
    responses((status = 200, description = "Histórico em ordem cronológica", body = Vec<HistoryRecord>)),
    security(("api_jwt" = []))
)]
pub async fn list_history(
    State(app_state): State<AppState>,
    locale: Locale,
    Path((kind, id)): Path<(PipelineKind, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let history = app_state
        .pipeline_service
        .history(kind, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_id_is_a_validation_error() {
        let err = required(None, "stageId").unwrap_err();
        let AppError::ValidationError(errors) = err else { panic!("esperava erro de validação") };
        assert!(errors.field_errors().contains_key("stageId"));
    }

    #[test]
    fn present_id_passes_through() {
        let id = Uuid::new_v4();
        assert_eq!(required(Some(id), "stageId").unwrap(), id);
    }
}
