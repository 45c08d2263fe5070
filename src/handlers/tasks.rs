// src/handlers/tasks.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{acting::Actor, i18n::Locale},
    models::tasks::{Task, TaskStatus},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct TaskFilter {
    /// pending | overdue | completed
    pub status: Option<TaskStatus>,
}

// GET /api/tasks
#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "Tarefas",
    params(TaskFilter),
    responses((status = 200, description = "Tarefas do usuário efetivo", body = Vec<Task>)),
    security(("api_jwt" = []))
)]
pub async fn list_tasks(
    State(app_state): State<AppState>,
    actor: Actor,
    locale: Locale,
    Query(filter): Query<TaskFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = app_state
        .task_service
        .list_tasks(&actor, filter.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(tasks))
}

// POST /api/tasks/{id}/complete
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/complete",
    tag = "Tarefas",
    params(("id" = Uuid, Path, description = "ID da tarefa")),
    responses(
        (status = 200, description = "Tarefa concluída (gatilho resolvido)", body = Task),
        (status = 403, description = "Tarefa de outro usuário"),
        (status = 404, description = "Não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn complete_task(
    State(app_state): State<AppState>,
    actor: Actor,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = app_state
        .task_service
        .complete_task(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(task))
}
