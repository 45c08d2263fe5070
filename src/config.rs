// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, sync::Arc, time::Duration};

use crate::{
    common::i18n::I18nStore,
    db::{
        ActivityRepository, ContractRepository, PipelineRepository, RbacRepository, TaskRepository,
        UserRepository,
    },
    models::pipeline::WonAutomation,
    services::{
        activity_service::ActivityService, auth::AuthService, contract_service::ContractService,
        pipeline_service::PipelineService, rbac_service::RbacService, task_service::TaskService,
    },
};

/// Configuração lida do ambiente (`.env` é opcional).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub won_automation: WonAutomation,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS inválido: {raw}"))?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            max_connections,
            won_automation: WonAutomation {
                funnel_name: env_or("WON_AUTOMATION_FUNNEL", "Prospecção"),
                stage_name: env_or("WON_AUTOMATION_STAGE", "Reunião Agendada"),
                task_type: env_or("WON_AUTOMATION_TASK_TYPE", "reuniao"),
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// O estado compartilhado que será acessível em toda a aplicação
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub i18n_store: Arc<I18nStore>,

    pub user_repo: UserRepository,
    pub rbac_repo: RbacRepository,

    pub auth_service: AuthService,
    pub rbac_service: RbacService,
    pub activity_service: ActivityService,
    pub task_service: TaskService,
    pub pipeline_service: PipelineService,
    pub contract_service: ContractService,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self::from_pool(db_pool, config))
    }

    /// Monta o gráfico de dependências sobre um pool já criado.
    pub fn from_pool(db_pool: PgPool, config: AppConfig) -> Self {
        let user_repo = UserRepository::new(db_pool.clone());
        let rbac_repo = RbacRepository::new(db_pool.clone());
        let activity_repo = ActivityRepository::new(db_pool.clone());
        let task_repo = TaskRepository::new(db_pool.clone());
        let pipeline_repo = PipelineRepository::new(db_pool.clone());
        let contract_repo = ContractRepository::new(db_pool.clone());

        let auth_service = AuthService::new(user_repo.clone(), config.jwt_secret.clone(), db_pool.clone());
        let rbac_service = RbacService::new(rbac_repo.clone(), db_pool.clone());
        let task_service = TaskService::new(task_repo.clone(), activity_repo.clone(), db_pool.clone());
        let activity_service =
            ActivityService::new(activity_repo, task_repo, user_repo.clone(), db_pool.clone());
        let pipeline_service = PipelineService::new(
            pipeline_repo,
            contract_repo.clone(),
            task_service.clone(),
            config.won_automation.clone(),
            db_pool.clone(),
        );
        let contract_service = ContractService::new(contract_repo, db_pool.clone());

        Self {
            db_pool,
            i18n_store: Arc::new(I18nStore::new()),
            user_repo,
            rbac_repo,
            auth_service,
            rbac_service,
            activity_service,
            task_service,
            pipeline_service,
            contract_service,
        }
    }
}
