// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;
use crate::models::pipeline::TransitionError;

// Erros de domínio. Os handlers convertem para ApiError com o idioma do cliente.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    #[error("Cabeçalho X-Acting-User-Id inválido")]
    InvalidActingUserHeader,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Permissão necessária: {0}")]
    PermissionDenied(String),

    #[error("Recurso não encontrado: {0}")]
    ResourceNotFound(String),

    #[error("Violação de unicidade: {0}")]
    UniqueConstraintViolation(String),

    #[error("Configuração de regra inválida: {0}")]
    InvalidRuleConfig(String),

    #[error("Atividade crítica inativa")]
    ActivityInactive,

    #[error("Status de cobrança desconhecido: {0}")]
    UnknownBillingStatus(String),

    #[error("Transição inválida: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

/// Erro pronto para sair pela API (já traduzido).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Chave da mensagem no I18nStore + argumento opcional interpolado em `{0}`.
    fn message_key(&self) -> (&'static str, Option<String>) {
        match self {
            AppError::ValidationError(_) => ("validation_error", None),
            AppError::EmailAlreadyExists => ("email_already_exists", None),
            AppError::InvalidCredentials => ("invalid_credentials", None),
            AppError::InvalidToken => ("invalid_token", None),
            AppError::InvalidActingUserHeader => ("invalid_acting_user", None),
            AppError::UserNotFound => ("user_not_found", None),
            AppError::PermissionDenied(slug) => ("permission_denied", Some(slug.clone())),
            AppError::ResourceNotFound(what) => ("resource_not_found", Some(what.clone())),
            AppError::UniqueConstraintViolation(what) => ("unique_violation", Some(what.clone())),
            AppError::InvalidRuleConfig(reason) => ("invalid_rule_config", Some(reason.clone())),
            AppError::ActivityInactive => ("activity_inactive", None),
            AppError::UnknownBillingStatus(status) => ("unknown_billing_status", Some(status.clone())),
            AppError::InvalidTransition(e) => (e.code(), None),
            _ => ("internal_error", None),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidActingUserHeader
            | AppError::InvalidRuleConfig(_)
            | AppError::ActivityInactive
            | AppError::UnknownBillingStatus(_) => StatusCode::BAD_REQUEST,
            AppError::EmailAlreadyExists | AppError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::UserNotFound | AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition(e) if e.is_conflict() => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_api_error(&self, locale: &Locale, store: &I18nStore) -> ApiError {
        let status = self.status_code();

        if status.is_server_error() {
            // O detalhe técnico fica no log, o cliente recebe só a mensagem genérica
            tracing::error!("Erro Interno do Servidor: {:?}", self);
        }

        let (key, arg) = self.message_key();
        let mut error = store.translate(&locale.0, key);
        if let Some(arg) = arg {
            error = error.replace("{0}", &arg);
        }

        let details = match self {
            AppError::ValidationError(errors) => {
                let mut details: HashMap<String, Vec<String>> = HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let codes: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), codes);
                }
                Some(json!(details))
            }
            _ => None,
        };

        ApiError { status, error, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pipeline::PipelineStatus;

    fn pt() -> Locale {
        Locale("pt".to_string())
    }

    #[test]
    fn transition_conflicts_map_to_409() {
        let err = AppError::InvalidTransition(TransitionError::NotActive(PipelineStatus::Won));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err = AppError::InvalidTransition(TransitionError::SameStage);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_errors_are_500_with_generic_message() {
        let store = I18nStore::new();
        let err = AppError::InternalServerError(anyhow::anyhow!("conexão recusada"));
        let api = err.to_api_error(&pt(), &store);

        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.error.contains("conexão recusada"));
    }

    #[test]
    fn not_found_interpolates_resource_name() {
        let store = I18nStore::new();
        let api = AppError::ResourceNotFound("Atividade".into()).to_api_error(&pt(), &store);

        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert!(api.error.contains("Atividade"));
    }

    #[test]
    fn bad_acting_header_is_400_in_the_client_language() {
        let store = I18nStore::new();
        let err = AppError::InvalidActingUserHeader;

        let pt_api = err.to_api_error(&pt(), &store);
        let en_api = err.to_api_error(&Locale("en".to_string()), &store);

        assert_eq!(pt_api.status, StatusCode::BAD_REQUEST);
        assert_eq!(en_api.status, StatusCode::BAD_REQUEST);
        assert!(pt_api.error.contains("X-Acting-User-Id"));
        assert!(en_api.error.contains("not a valid UUID"));
        assert_ne!(pt_api.error, en_api.error);
    }

    #[test]
    fn validation_details_list_field_codes() {
        let mut errors = validator::ValidationErrors::new();
        let mut e = validator::ValidationError::new("required");
        e.message = Some("required".into());
        errors.add("stage_id", e);

        let api = AppError::ValidationError(errors).to_api_error(&pt(), &I18nStore::new());

        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        let details = api.details.expect("detalhes de validação");
        assert_eq!(details["stage_id"][0], "required");
    }
}
