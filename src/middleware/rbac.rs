// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
};

/// 1. O Trait que define o que é uma Permissão
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
}

/// 2. O Extractor (Guardião)
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let locale = Locale::from_headers(&parts.headers);

        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or_else(|| AppError::InvalidToken.to_api_error(&locale, &app_state.i18n_store))?;

        let required_perm = T::slug();

        let has_permission = app_state
            .rbac_repo
            .user_has_permission(user.0.id, required_perm)
            .await
            .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

        if !has_permission {
            return Err(AppError::PermissionDenied(required_perm.to_string())
                .to_api_error(&locale, &app_state.i18n_store));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// ---
// DEFINIÇÃO DAS PERMISSÕES (TIPOS)
// ---

pub struct PermActivitiesManage;
impl PermissionDef for PermActivitiesManage {
    fn slug() -> &'static str { "activities:manage" }
}

pub struct PermPipelineWrite;
impl PermissionDef for PermPipelineWrite {
    fn slug() -> &'static str { "pipeline:write" }
}

pub struct PermContractsWrite;
impl PermissionDef for PermContractsWrite {
    fn slug() -> &'static str { "contracts:write" }
}

pub struct PermTeamImpersonate;
impl PermissionDef for PermTeamImpersonate {
    fn slug() -> &'static str { "team:impersonate" }
}

pub struct PermRolesManage;
impl PermissionDef for PermRolesManage {
    fn slug() -> &'static str { "roles:manage" }
}
