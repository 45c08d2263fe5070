// src/handlers/rbac.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{PermRolesManage, RequirePermission},
    },
    models::rbac::{AssignRolePayload, CreateRolePayload, Permission, RoleResponse},
};

// POST /api/roles
#[utoipa::path(
    post,
    path = "/api/roles",
    tag = "RBAC",
    request_body = CreateRolePayload,
    responses(
        (status = 201, description = "Cargo criado", body = RoleResponse),
        (status = 403, description = "Sem permissão"),
        (status = 409, description = "Nome já usado")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesManage>,
    locale: Locale,
    Json(payload): Json<CreateRolePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let response = app_state
        .rbac_service
        .create_role_with_permissions(payload.name, payload.description, payload.permissions)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(response)))
}

// PUT /api/users/{id}/role
#[utoipa::path(
    put,
    path = "/api/users/{id}/role",
    tag = "RBAC",
    request_body = AssignRolePayload,
    params(("id" = Uuid, Path, description = "ID do usuário")),
    responses(
        (status = 204, description = "Cargo atribuído"),
        (status = 404, description = "Usuário ou cargo não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn assign_role(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermRolesManage>,
    locale: Locale,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRolePayload>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .rbac_service
        .assign_role(user_id, payload.role_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(StatusCode::NO_CONTENT)
}

// GET /api/permissions (para o frontend montar a tela de cargos)
#[utoipa::path(
    get,
    path = "/api/permissions",
    tag = "RBAC",
    responses((status = 200, description = "Permissões do sistema", body = Vec<Permission>)),
    security(("api_jwt" = []))
)]
pub async fn list_permissions(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let permissions = app_state
        .rbac_service
        .list_system_permissions()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(permissions))
}
