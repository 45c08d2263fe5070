// src/services/rbac_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::db::RbacRepository;
use crate::models::rbac::{Permission, RoleResponse};

#[derive(Clone)]
pub struct RbacService {
    repo: RbacRepository,
    pool: PgPool,
}

impl RbacService {
    pub fn new(repo: RbacRepository, pool: PgPool) -> Self {
        Self { repo, pool }
    }

    pub async fn create_role_with_permissions(
        &self,
        name: String,
        description: Option<String>,
        permission_slugs: Vec<String>,
    ) -> Result<RoleResponse, AppError> {
        let mut tx = self.pool.begin().await?;

        let role = self.repo.create_role(&mut *tx, &name, description.as_deref()).await?;

        // Slugs ("pipeline:write") -> IDs. Slugs desconhecidos são ignorados.
        let permissions = self.repo.find_permissions_by_slugs(&mut *tx, &permission_slugs).await?;

        let permission_ids: Vec<Uuid> = permissions.iter().map(|p| p.id).collect();
        let valid_slugs: Vec<String> = permissions.into_iter().map(|p| p.slug).collect();

        if !permission_ids.is_empty() {
            self.repo.assign_permissions(&mut *tx, role.id, &permission_ids).await?;
        }

        tx.commit().await?;

        tracing::info!(role_id = %role.id, permissions = ?valid_slugs, "🛡️ Cargo criado");

        Ok(RoleResponse { role, permissions: valid_slugs })
    }

    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), AppError> {
        let updated = self.repo.assign_role_to_user(&self.pool, user_id, role_id).await?;
        if !updated {
            return Err(AppError::UserNotFound);
        }
        Ok(())
    }

    pub async fn list_system_permissions(&self) -> Result<Vec<Permission>, AppError> {
        self.repo.list_all_permissions().await
    }
}
