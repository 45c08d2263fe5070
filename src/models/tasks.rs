// src/models/tasks.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Tipo das tarefas geradas pelo avaliador de atividades críticas.
pub const CRITICAL_ACTIVITY_TASK_TYPE: &str = "atividade_critica";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Overdue,
    Completed,
}

impl TaskStatus {
    pub fn is_open(self) -> bool {
        self != TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Uuid,
    pub contact_id: Option<Uuid>,
    #[schema(example = "Pagamento atrasado: Maria da Silva")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "atividade_critica")]
    pub task_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dados de uma tarefa a ser inserida.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub created_by: Uuid,
    pub assigned_to: Uuid,
    pub contact_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub task_type: String,
    pub scheduled_at: DateTime<Utc>,
}
