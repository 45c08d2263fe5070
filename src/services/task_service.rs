// src/services/task_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::set_actor_context, error::AppError},
    db::{ActivityRepository, TaskRepository},
    middleware::acting::Actor,
    models::tasks::{Task, TaskStatus},
};

#[derive(Clone)]
pub struct TaskService {
    task_repo: TaskRepository,
    activity_repo: ActivityRepository,
    pool: PgPool,
}

impl TaskService {
    pub fn new(task_repo: TaskRepository, activity_repo: ActivityRepository, pool: PgPool) -> Self {
        Self { task_repo, activity_repo, pool }
    }

    pub async fn list_tasks(&self, actor: &Actor, status: Option<TaskStatus>) -> Result<Vec<Task>, AppError> {
        let user_id = actor.effective_user_id();
        self.task_repo.mark_overdue(&self.pool, user_id).await?;
        self.task_repo.list_for_user(user_id, status).await
    }

    /// Conclui a tarefa e resolve o gatilho ligado a ela, na mesma transação.
    pub async fn complete_task(&self, actor: &Actor, task_id: Uuid) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let task = self
            .task_repo
            .find_by_id(&mut *tx, task_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("Tarefa".into()))?;

        if task.assigned_to != actor.effective_user_id() {
            return Err(AppError::PermissionDenied("tasks:own".into()));
        }

        // Já concluída: nada muda
        if !task.status.is_open() {
            return Ok(task);
        }

        let Some(completed) = self.task_repo.complete_task(&mut *tx, task_id).await? else {
            return Ok(task);
        };

        let resolved = self.activity_repo.resolve_trigger_for_task(&mut *tx, task_id).await?;
        tx.commit().await?;

        tracing::info!(task_id = %task_id, trigger_resolved = resolved, "☑️ Tarefa concluída");
        Ok(completed)
    }

    /// Conclui a tarefa aberta mais antiga do tipo (responsável + contato)
    /// e resolve o gatilho dela. `None` quando não há tarefa aberta.
    pub async fn complete_oldest_open(
        &self,
        actor: &Actor,
        assigned_to: Uuid,
        contact_id: Uuid,
        task_type: &str,
    ) -> Result<Option<Task>, AppError> {
        let mut tx = self.pool.begin().await?;
        set_actor_context(&mut tx, actor).await?;

        let Some(task) = self
            .task_repo
            .complete_oldest_open_task(&mut *tx, assigned_to, contact_id, task_type)
            .await?
        else {
            return Ok(None);
        };

        self.activity_repo.resolve_trigger_for_task(&mut *tx, task.id).await?;
        tx.commit().await?;

        Ok(Some(task))
    }
}
