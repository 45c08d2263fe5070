// src/testing.rs
//
// Fixtures compartilhadas pelos testes dos services e das rotas.

use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    config::{AppConfig, AppState},
    middleware::acting::Actor,
    models::{
        auth::User,
        pipeline::{Contact, Funnel, Stage, WonAutomation},
    },
    services::pipeline_service::ContactInput,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/planejamento_test".to_string(),
        jwt_secret: "segredo-de-teste".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        max_connections: 1,
        won_automation: WonAutomation {
            funnel_name: "Prospecção".to_string(),
            stage_name: "Reunião Agendada".to_string(),
            task_type: "reuniao".to_string(),
        },
    }
}

/// Estado sobre um pool que nunca conecta. Serve para rotas que não chegam ao banco.
pub fn lazy_state() -> AppState {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();
    AppState::from_pool(pool, config)
}

/// Estado sobre o banco isolado criado pelo `#[sqlx::test]`.
pub fn state(pool: PgPool) -> AppState {
    AppState::from_pool(pool, test_config())
}

pub async fn planner(state: &AppState, email: &str) -> (User, Actor) {
    let user = state
        .user_repo
        .create_user(&state.db_pool, email, "Planejador de Teste", "hash-nao-usado")
        .await
        .unwrap();
    let actor = Actor::new(user.id);
    (user, actor)
}

/// Funil com uma única etapa.
pub async fn funnel(state: &AppState, name: &str, stage: &str) -> (Funnel, Stage) {
    let funnel = state.pipeline_service.create_funnel(name).await.unwrap();
    let stage = state
        .pipeline_service
        .create_stage(funnel.id, stage, 1)
        .await
        .unwrap();
    (funnel, stage)
}

/// Contato na primeira etapa do funil.
pub async fn contact(state: &AppState, actor: &Actor, funnel_id: Uuid, name: &str) -> Contact {
    state
        .pipeline_service
        .create_contact(
            actor,
            ContactInput {
                full_name: name.to_string(),
                email: None,
                phone: None,
                marital_status: None,
                gender: None,
                goal_types: vec![],
                funnel_id,
                stage_id: None,
            },
        )
        .await
        .unwrap()
}
