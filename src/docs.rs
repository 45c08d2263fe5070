// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::get_me,

        // --- RBAC ---
        handlers::rbac::create_role,
        handlers::rbac::assign_role,
        handlers::rbac::list_permissions,

        // --- Atividades críticas ---
        handlers::activities::create_activity,
        handlers::activities::list_activities,
        handlers::activities::get_activity,
        handlers::activities::set_activity_status,
        handlers::activities::replace_assignments,
        handlers::activities::preview_activity,
        handlers::activities::evaluate_perpetual_activities,
        handlers::activities::evaluate_single_activity,

        // --- Tarefas ---
        handlers::tasks::list_tasks,
        handlers::tasks::complete_task,

        // --- Funil ---
        handlers::pipeline::create_funnel,
        handlers::pipeline::list_funnels,
        handlers::pipeline::create_stage,
        handlers::pipeline::list_stages,
        handlers::pipeline::create_lost_reason,
        handlers::pipeline::list_lost_reasons,
        handlers::pipeline::create_contact,
        handlers::pipeline::list_contacts,
        handlers::pipeline::create_opportunity,
        handlers::pipeline::list_opportunities,
        handlers::pipeline::move_stage,
        handlers::pipeline::mark_lost,
        handlers::pipeline::mark_won,
        handlers::pipeline::reactivate,
        handlers::pipeline::list_history,

        // --- Contratos ---
        handlers::contracts::create_product,
        handlers::contracts::list_products,
        handlers::contracts::create_contract,
        handlers::contracts::list_contact_contracts,
        handlers::contracts::sync_billing_status,
        handlers::contracts::record_health_score,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::User,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::AuthResponse,

            // --- RBAC ---
            models::rbac::Role,
            models::rbac::Permission,
            models::rbac::CreateRolePayload,
            models::rbac::AssignRolePayload,
            models::rbac::RoleResponse,

            // --- Atividades críticas ---
            models::activities::RuleType,
            models::activities::RecurrenceInterval,
            models::activities::FilterType,
            models::activities::FilterOperator,
            models::activities::LowHealthScoreConfig,
            models::activities::ExpiringContractConfig,
            models::activities::ManualRecurrenceConfig,
            models::activities::CharacteristicMatchConfig,
            models::activities::CriticalActivity,
            models::activities::ActivityTrigger,
            models::activities::TriggerDecision,
            models::activities::RuleMatch,
            models::activities::ActivityRunReport,
            models::activities::MatchPreview,
            handlers::activities::CreateActivityPayload,
            handlers::activities::SetActivityStatusPayload,
            handlers::activities::AssignmentsPayload,
            handlers::activities::EvaluateSinglePayload,
            handlers::activities::EvaluateAllResponse,
            handlers::activities::EvaluateSingleResponse,

            // --- Tarefas ---
            models::tasks::TaskStatus,
            models::tasks::Task,

            // --- Funil ---
            models::pipeline::PipelineStatus,
            models::pipeline::HistoryAction,
            models::pipeline::PipelineKind,
            models::pipeline::Funnel,
            models::pipeline::Stage,
            models::pipeline::LostReason,
            models::pipeline::Contact,
            models::pipeline::Opportunity,
            models::pipeline::PipelineState,
            models::pipeline::HistoryRecord,
            models::pipeline::TransitionOutcome,
            handlers::pipeline::NamePayload,
            handlers::pipeline::CreateStagePayload,
            handlers::pipeline::CreateContactPayload,
            handlers::pipeline::CreateOpportunityPayload,
            handlers::pipeline::MoveStagePayload,
            handlers::pipeline::MarkLostPayload,
            handlers::pipeline::MarkWonPayload,

            // --- Contratos ---
            models::contracts::ContractStatus,
            models::contracts::BillingStatus,
            models::contracts::Product,
            models::contracts::Contract,
            models::contracts::HealthScoreSnapshot,
            handlers::contracts::CreateProductPayload,
            handlers::contracts::CreateContractPayload,
            handlers::contracts::BillingSyncPayload,
            handlers::contracts::HealthScorePayload,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação e Registro"),
        (name = "RBAC", description = "Controle de Acesso (Cargos e Permissões)"),
        (name = "Atividades Críticas", description = "Regras que geram tarefas automaticamente"),
        (name = "Funções", description = "Avaliação das regras (agendador)"),
        (name = "Tarefas", description = "Tarefas do planejador"),
        (name = "Funil", description = "Contatos, oportunidades e transições de etapa"),
        (name = "Contratos", description = "Produtos, contratos, cobrança e health score")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
