// src/models/rbac.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// O que sai do banco (Tabela Roles)
#[derive(Debug, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,

    #[schema(example = "Líder de Equipe")]
    pub name: String,

    #[schema(example = "Acompanha a carteira dos planejadores da equipe")]
    pub description: Option<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// O que sai do banco (Tabela Permissions)
#[derive(Debug, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440001")]
    pub id: Uuid,

    #[schema(example = "pipeline:write")]
    pub slug: String,

    #[schema(example = "Movimentar contatos e oportunidades no funil")]
    pub description: String,

    #[schema(example = "PIPELINE")]
    pub module: String,
}

// O Payload para criar um cargo
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRolePayload {
    #[schema(example = "Planejador")]
    pub name: String,

    #[schema(example = "Movimenta o próprio funil")]
    pub description: Option<String>,

    #[schema(example = json!(["pipeline:write"]))]
    pub permissions: Vec<String>, // Slugs das permissões
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignRolePayload {
    pub role_id: Uuid,
}

// Resposta completa (Cargo + Lista de Permissões)
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,

    #[schema(example = json!(["pipeline:write"]))]
    pub permissions: Vec<String>,
}
