// src/db/task_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::tasks::{NewTask, Task, TaskStatus},
};

const TASK_COLUMNS: &str = "id, created_by, assigned_to, contact_id, title, description, task_type, \
     scheduled_at, status, completed_at, created_at, updated_at";

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_task<'e, E>(&self, executor: E, task: &NewTask) -> Result<Task, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let created = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (
                created_by, assigned_to, contact_id, title, description, task_type, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.created_by)
        .bind(task.assigned_to)
        .bind(task.contact_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.task_type)
        .bind(task.scheduled_at)
        .fetch_one(executor)
        .await?;

        Ok(created)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Task>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let task = sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(task)
    }

    /// Tarefas pendentes com data passada viram `overdue`.
    pub async fn mark_overdue<'e, E>(&self, executor: E, assigned_to: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'overdue', updated_at = NOW()
            WHERE assigned_to = $1 AND status = 'pending' AND scheduled_at < NOW()
            "#,
        )
        .bind(assigned_to)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_for_user(
        &self,
        assigned_to: Uuid,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, AppError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE assigned_to = $1 AND ($2::task_status IS NULL OR status = $2)
            ORDER BY scheduled_at, created_at, id
            "#
        ))
        .bind(assigned_to)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    pub async fn complete_task<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Task>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(task)
    }

    /// Conclui a tarefa aberta mais antiga do tipo para o responsável e contato.
    pub async fn complete_oldest_open_task<'e, E>(
        &self,
        executor: E,
        assigned_to: Uuid,
        contact_id: Uuid,
        task_type: &str,
    ) -> Result<Option<Task>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM tasks
                WHERE assigned_to = $1
                  AND contact_id = $2
                  AND task_type = $3
                  AND status IN ('pending', 'overdue')
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE
            )
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(assigned_to)
        .bind(contact_id)
        .bind(task_type)
        .fetch_optional(executor)
        .await?;

        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::{TimeZone, Utc};

    fn meeting(owner: Uuid, contact_id: Uuid, title: &str) -> NewTask {
        NewTask {
            created_by: owner,
            assigned_to: owner,
            contact_id: Some(contact_id),
            title: title.to_string(),
            description: None,
            task_type: "reuniao".to_string(),
            scheduled_at: Utc::now(),
        }
    }

    #[sqlx::test]
    async fn oldest_open_task_ties_are_broken_by_id(pool: PgPool) {
        let state = testing::state(pool.clone());
        let (user, actor) = testing::planner(&state, "ana@planejamento.com.br").await;
        let (funnel, _) = testing::funnel(&state, "Prospecção", "Reunião Agendada").await;
        let contact = testing::contact(&state, &actor, funnel.id, "Maria da Silva").await;
        let repo = TaskRepository::new(pool.clone());

        let a = repo.create_task(&pool, &meeting(user.id, contact.id, "Reunião A")).await.unwrap();
        let b = repo.create_task(&pool, &meeting(user.id, contact.id, "Reunião B")).await.unwrap();

        let same_instant = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        sqlx::query("UPDATE tasks SET created_at = $1 WHERE id = ANY($2)")
            .bind(same_instant)
            .bind(vec![a.id, b.id])
            .execute(&pool)
            .await
            .unwrap();

        let (first_id, second_id) = if a.id < b.id { (a.id, b.id) } else { (b.id, a.id) };

        let first = repo
            .complete_oldest_open_task(&pool, user.id, contact.id, "reuniao")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, first_id);
        assert_eq!(first.status, TaskStatus::Completed);

        let second = repo
            .complete_oldest_open_task(&pool, user.id, contact.id, "reuniao")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, second_id);

        let none = repo
            .complete_oldest_open_task(&pool, user.id, contact.id, "reuniao")
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
