// src/middleware/acting.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermTeamImpersonate, PermissionDef},
    },
};

// Cabeçalho para líderes agirem em nome de um planejador da equipe
const ACTING_USER_HEADER: &str = "x-acting-user-id";

/// Quem está fazendo a operação. Passado explicitamente para os services,
/// nunca lido de estado global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub acting_user_id: Option<Uuid>,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, acting_user_id: None }
    }

    /// Usuário em nome de quem os dados são lidos/escritos.
    pub fn effective_user_id(&self) -> Uuid {
        self.acting_user_id.unwrap_or(self.user_id)
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_headers(&parts.headers);
        let to_api = |e: AppError| e.to_api_error(&locale, &app_state.i18n_store);

        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| to_api(AppError::InvalidToken))?;

        let Some(raw) = parts.headers.get(ACTING_USER_HEADER) else {
            return Ok(Actor::new(user.0.id));
        };

        let acting_user_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| to_api(AppError::InvalidActingUserHeader))?;

        if acting_user_id == user.0.id {
            return Ok(Actor::new(user.0.id));
        }

        let allowed = app_state
            .rbac_repo
            .user_has_permission(user.0.id, PermTeamImpersonate::slug())
            .await
            .map_err(to_api)?;

        if !allowed {
            return Err(to_api(AppError::PermissionDenied(PermTeamImpersonate::slug().to_string())));
        }

        let target = app_state
            .user_repo
            .find_by_id(acting_user_id)
            .await
            .map_err(to_api)?;

        match target {
            Some(target) if target.is_active => {
                tracing::info!(user_id = %user.0.id, acting_user_id = %acting_user_id, "Agindo em nome de outro usuário");
                Ok(Actor { user_id: user.0.id, acting_user_id: Some(acting_user_id) })
            }
            _ => Err(to_api(AppError::UserNotFound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::auth::User, testing};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;

    fn parts_with_header(value: &str, lang: &str) -> Parts {
        let user = User {
            id: Uuid::new_v4(),
            email: "lider@planejamento.com.br".into(),
            full_name: "Líder".into(),
            password_hash: String::new(),
            role_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let (mut parts, _) = Request::get("/api/tasks")
            .header(ACTING_USER_HEADER, value)
            .header("accept-language", lang)
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(AuthenticatedUser(user));
        parts
    }

    #[tokio::test]
    async fn malformed_acting_header_is_rejected_in_the_client_language() {
        let state = testing::lazy_state();

        let mut parts = parts_with_header("nao-e-uuid", "en");
        let err = Actor::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "Invalid X-Acting-User-Id header (not a valid UUID).");

        let mut parts = parts_with_header("nao-e-uuid", "pt-BR");
        let err = Actor::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.error, "Cabeçalho X-Acting-User-Id inválido (não é um UUID).");
    }

    #[test]
    fn effective_user_is_the_logged_user_by_default() {
        let id = Uuid::new_v4();
        assert_eq!(Actor::new(id).effective_user_id(), id);
    }

    #[test]
    fn effective_user_follows_acting_user() {
        let leader = Uuid::new_v4();
        let planner = Uuid::new_v4();
        let actor = Actor { user_id: leader, acting_user_id: Some(planner) };
        assert_eq!(actor.effective_user_id(), planner);
    }
}
