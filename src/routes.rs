// src/routes.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers, middleware::auth::auth_guard};

pub fn build_router(app_state: AppState) -> Router {
    // Rotas públicas
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    let user_routes = Router::new()
        .route("/me", get(handlers::auth::get_me))
        .route("/{id}/role", put(handlers::rbac::assign_role));

    let activity_routes = Router::new()
        .route("/{id}", get(handlers::activities::get_activity))
        .route("/{id}/status", patch(handlers::activities::set_activity_status))
        .route("/{id}/assignments", put(handlers::activities::replace_assignments))
        .route("/{id}/preview", get(handlers::activities::preview_activity));

    // Disparadas pelo agendador externo
    let function_routes = Router::new()
        .route(
            "/evaluate-perpetual-activities",
            post(handlers::activities::evaluate_perpetual_activities),
        )
        .route(
            "/evaluate-single-activity",
            post(handlers::activities::evaluate_single_activity),
        );

    let task_routes = Router::new()
        .route("/{id}/complete", post(handlers::tasks::complete_task));

    let pipeline_routes = Router::new()
        .route("/{kind}/{id}/move", post(handlers::pipeline::move_stage))
        .route("/{kind}/{id}/lost", post(handlers::pipeline::mark_lost))
        .route("/{kind}/{id}/won", post(handlers::pipeline::mark_won))
        .route("/{kind}/{id}/reactivate", post(handlers::pipeline::reactivate))
        .route("/{kind}/{id}/history", get(handlers::pipeline::list_history));

    let protected = Router::new()
        .nest("/api/users", user_routes)
        .nest("/api/activities", activity_routes)
        .nest("/api/functions", function_routes)
        .nest("/api/tasks", task_routes)
        .nest("/api/pipeline", pipeline_routes)
        .route(
            "/api/activities",
            post(handlers::activities::create_activity).get(handlers::activities::list_activities),
        )
        .route("/api/tasks", get(handlers::tasks::list_tasks))
        .route("/api/roles", post(handlers::rbac::create_role))
        .route("/api/permissions", get(handlers::rbac::list_permissions))
        .route(
            "/api/funnels",
            post(handlers::pipeline::create_funnel).get(handlers::pipeline::list_funnels),
        )
        .route(
            "/api/funnels/{id}/stages",
            post(handlers::pipeline::create_stage).get(handlers::pipeline::list_stages),
        )
        .route(
            "/api/lost-reasons",
            post(handlers::pipeline::create_lost_reason).get(handlers::pipeline::list_lost_reasons),
        )
        .route(
            "/api/contacts",
            post(handlers::pipeline::create_contact).get(handlers::pipeline::list_contacts),
        )
        .route(
            "/api/opportunities",
            post(handlers::pipeline::create_opportunity).get(handlers::pipeline::list_opportunities),
        )
        .route(
            "/api/products",
            post(handlers::contracts::create_product).get(handlers::contracts::list_products),
        )
        .route("/api/contracts", post(handlers::contracts::create_contract))
        .route("/api/contacts/{id}/contracts", get(handlers::contracts::list_contact_contracts))
        .route("/api/contracts/{id}/billing-sync", post(handlers::contracts::sync_billing_status))
        .route("/api/contacts/{id}/health-scores", post(handlers::contracts::record_health_score))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes)
        .merge(protected)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    // Pool preguiçoso: nenhuma destas rotas chega ao banco
    fn router() -> Router {
        build_router(testing::lazy_state())
    }

    #[tokio::test]
    async fn health_check_is_public() {
        let response = router()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let response = router()
            .oneshot(Request::get("/api/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let request = Request::post("/api/functions/evaluate-perpetual-activities")
            .header("Authorization", "Bearer nao-e-um-jwt")
            .body(Body::empty())
            .unwrap();

        let response = router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = router()
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/api/functions/evaluate-single-activity"].is_object());
    }
}
