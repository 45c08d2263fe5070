// src/handlers/contracts.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    db::contract_repo::NewContract,
    middleware::{
        acting::Actor,
        i18n::Locale,
        rbac::{PermContractsWrite, RequirePermission},
    },
    models::contracts::{BillingStatus, Contract, HealthScoreSnapshot, Product},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductPayload {
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "Seguro de Vida Resgatável")]
    pub name: String,
    #[validate(length(min = 2, message = "required"))]
    #[schema(example = "seguro")]
    pub category: String,
    #[schema(value_type = Option<String>, example = "12.5")]
    pub pb_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractPayload {
    pub contact_id: Uuid,
    pub opportunity_id: Option<Uuid>,
    pub product_id: Uuid,
    #[schema(value_type = String, example = "1500.00")]
    pub value: Decimal,
    pub billing_status: Option<BillingStatus>,
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = Date, example = "2025-01-01")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingSyncPayload {
    /// Status no vocabulário do gateway (ex.: paid, past_due, cancelled)
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "past_due")]
    pub gateway_status: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthScorePayload {
    #[validate(range(min = 0, max = 100, message = "invalid_score"))]
    #[schema(example = 35)]
    pub score: i32,
}

// POST /api/products
#[utoipa::path(
    post,
    path = "/api/products",
    tag = "Contratos",
    request_body = CreateProductPayload,
    responses(
        (status = 201, description = "Produto criado", body = Product),
        (status = 409, description = "Produto já existe")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_product(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermContractsWrite>,
    locale: Locale,
    Json(payload): Json<CreateProductPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let product = app_state
        .contract_service
        .create_product(&payload.name, &payload.category, payload.pb_rate)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(product)))
}

// GET /api/products
#[utoipa::path(
    get,
    path = "/api/products",
    tag = "Contratos",
    responses((status = 200, description = "Produtos", body = Vec<Product>)),
    security(("api_jwt" = []))
)]
pub async fn list_products(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let products = app_state
        .contract_service
        .list_products()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(products))
}

// POST /api/contracts
#[utoipa::path(
    post,
    path = "/api/contracts",
    tag = "Contratos",
    request_body = CreateContractPayload,
    responses(
        (status = 201, description = "Contrato criado", body = Contract),
        (status = 404, description = "Contato, oportunidade ou produto inexistente")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_contract(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermContractsWrite>,
    actor: Actor,
    locale: Locale,
    Json(payload): Json<CreateContractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = app_state
        .contract_service
        .create_contract(
            &actor,
            NewContract {
                contact_id: payload.contact_id,
                opportunity_id: payload.opportunity_id,
                product_id: payload.product_id,
                value: payload.value,
                billing_status: payload.billing_status.unwrap_or(BillingStatus::Pending),
                start_date: payload.start_date,
                end_date: payload.end_date,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(contract)))
}

// GET /api/contacts/{id}/contracts
#[utoipa::path(
    get,
    path = "/api/contacts/{id}/contracts",
    tag = "Contratos",
    params(("id" = Uuid, Path, description = "ID do contato")),
    responses((status = 200, description = "Contratos do contato", body = Vec<Contract>)),
    security(("api_jwt" = []))
)]
pub async fn list_contact_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(contact_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contracts = app_state
        .contract_service
        .list_contracts_for_contact(contact_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(contracts))
}

// POST /api/contracts/{id}/billing-sync
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/billing-sync",
    tag = "Contratos",
    request_body = BillingSyncPayload,
    params(("id" = Uuid, Path, description = "ID do contrato")),
    responses(
        (status = 200, description = "Status de cobrança atualizado", body = Contract),
        (status = 400, description = "Status desconhecido"),
        (status = 404, description = "Contrato não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn sync_billing_status(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermContractsWrite>,
    locale: Locale,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<BillingSyncPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let contract = app_state
        .contract_service
        .sync_billing_status(contract_id, &payload.gateway_status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(contract))
}

// POST /api/contacts/{id}/health-scores
#[utoipa::path(
    post,
    path = "/api/contacts/{id}/health-scores",
    tag = "Contratos",
    request_body = HealthScorePayload,
    params(("id" = Uuid, Path, description = "ID do contato")),
    responses(
        (status = 201, description = "Snapshot registrado", body = HealthScoreSnapshot),
        (status = 404, description = "Contato não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn record_health_score(
    State(app_state): State<AppState>,
    _perm: RequirePermission<PermContractsWrite>,
    locale: Locale,
    Path(contact_id): Path<Uuid>,
    Json(payload): Json<HealthScorePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let snapshot = app_state
        .contract_service
        .record_health_score(contact_id, payload.score)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}
