// src/handlers/activities.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        acting::Actor,
        i18n::Locale,
        rbac::{PermActivitiesManage, RequirePermission},
    },
    models::activities::{ActivityRunReport, CriticalActivity, MatchPreview, RuleType},
    services::activity_service::NewActivity,
};

fn default_true() -> bool {
    true
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityPayload {
    #[validate(length(min = 3, message = "required"))]
    #[schema(example = "Cliente com health score crítico")]
    pub title: String,

    pub description: Option<String>,

    pub rule_type: RuleType,

    #[serde(default = "empty_object")]
    #[schema(value_type = Object, example = json!({"threshold": 40}))]
    pub rule_config: Value,

    #[serde(default = "default_true")]
    pub is_perpetual: bool,

    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetActivityStatusPayload {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentsPayload {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateSinglePayload {
    pub activity_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluateAllResponse {
    pub success: bool,
    pub results: Vec<ActivityRunReport>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluateSingleResponse {
    pub success: bool,
    pub tasks_created: u32,
}

// =============================================================================
//  CADASTRO DE ATIVIDADES CRÍTICAS
// =============================================================================

// POST /api/activities
#[utoipa::path(
    post,
    path = "/api/activities",
    tag = "Atividades Críticas",
    request_body = CreateActivityPayload,
    responses(
        (status = 201, description = "Atividade criada", body = CriticalActivity),
        (status = 400, description = "Configuração da regra inválida"),
        (status = 403, description = "Sem permissão")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_activity(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    actor: Actor,
    locale: Locale,
    Json(payload): Json<CreateActivityPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let activity = app_state
        .activity_service
        .create_activity(
            &actor,
            NewActivity {
                title: payload.title,
                description: payload.description,
                rule_type: payload.rule_type,
                rule_config: payload.rule_config,
                is_perpetual: payload.is_perpetual,
                assignee_ids: payload.assignee_ids,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(activity)))
}

// GET /api/activities
#[utoipa::path(
    get,
    path = "/api/activities",
    tag = "Atividades Críticas",
    responses((status = 200, description = "Atividades cadastradas", body = Vec<CriticalActivity>)),
    security(("api_jwt" = []))
)]
pub async fn list_activities(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let activities = app_state
        .activity_service
        .list_activities()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(activities))
}

// GET /api/activities/{id}
#[utoipa::path(
    get,
    path = "/api/activities/{id}",
    tag = "Atividades Críticas",
    params(("id" = Uuid, Path, description = "ID da atividade")),
    responses(
        (status = 200, description = "Atividade", body = CriticalActivity),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_activity(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = app_state
        .activity_service
        .get_activity(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(activity))
}

// PATCH /api/activities/{id}/status
#[utoipa::path(
    patch,
    path = "/api/activities/{id}/status",
    tag = "Atividades Críticas",
    request_body = SetActivityStatusPayload,
    params(("id" = Uuid, Path, description = "ID da atividade")),
    responses(
        (status = 200, description = "Atividade atualizada", body = CriticalActivity),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_activity_status(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActivityStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let activity = app_state
        .activity_service
        .set_active(id, payload.is_active)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(activity))
}

// PUT /api/activities/{id}/assignments
#[utoipa::path(
    put,
    path = "/api/activities/{id}/assignments",
    tag = "Atividades Críticas",
    request_body = AssignmentsPayload,
    params(("id" = Uuid, Path, description = "ID da atividade")),
    responses(
        (status = 200, description = "Responsáveis atuais", body = Vec<Uuid>),
        (status = 404, description = "Atividade ou usuário não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn replace_assignments(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignmentsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let assignees = app_state
        .activity_service
        .replace_assignments(id, &payload.user_ids)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(assignees))
}

// GET /api/activities/{id}/preview
#[utoipa::path(
    get,
    path = "/api/activities/{id}/preview",
    tag = "Atividades Críticas",
    params(("id" = Uuid, Path, description = "ID da atividade")),
    responses(
        (status = 200, description = "O que a próxima avaliação faria", body = Vec<MatchPreview>),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn preview_activity(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = app_state
        .activity_service
        .preview(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(preview))
}

// =============================================================================
//  FUNÇÕES DE AVALIAÇÃO (chamadas pelo agendador)
// =============================================================================

// POST /api/functions/evaluate-perpetual-activities
#[utoipa::path(
    post,
    path = "/api/functions/evaluate-perpetual-activities",
    tag = "Funções",
    responses(
        (status = 200, description = "Relatório por atividade", body = EvaluateAllResponse),
        (status = 500, description = "Falha ao carregar as atividades")
    ),
    security(("api_jwt" = []))
)]
pub async fn evaluate_perpetual_activities(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    actor: Actor,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let results = app_state
        .activity_service
        .evaluate_all(&actor)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(EvaluateAllResponse { success: true, results }))
}

// POST /api/functions/evaluate-single-activity
#[utoipa::path(
    post,
    path = "/api/functions/evaluate-single-activity",
    tag = "Funções",
    request_body = EvaluateSinglePayload,
    responses(
        (status = 200, description = "Tarefas criadas", body = EvaluateSingleResponse),
        (status = 400, description = "Atividade inativa ou configuração inválida"),
        (status = 404, description = "Atividade não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn evaluate_single_activity(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermActivitiesManage>,
    actor: Actor,
    locale: Locale,
    Json(payload): Json<EvaluateSinglePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks_created = app_state
        .activity_service
        .evaluate_single(&actor, payload.activity_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(EvaluateSingleResponse { success: true, tasks_created }))
}
