use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::warn;

use super::{AdminIdentity, Identity, MemberIdentity};
use crate::state::AppState;
use crate::utils::error::AppError;

fn bearer(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::AuthError("missing authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|credential| !credential.is_empty())
        .ok_or_else(|| AppError::AuthError("expected a bearer credential".to_string()))
}

async fn resolve(parts: &mut Parts, state: &AppState) -> Result<Identity, AppError> {
    if let Some(identity) = parts.extensions.get::<Identity>() {
        return Ok(*identity);
    }

    let identity = state.identity.resolve(bearer(parts)?).await.map_err(|e| {
        warn!(uri = %parts.uri, error = %e, "Authentication failed");
        e
    })?;
    parts.extensions.insert(identity);
    Ok(identity)
}

#[async_trait]
impl FromRequestParts<AppState> for AdminIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await? {
            Identity::Admin(admin) => Ok(admin),
            Identity::Member(_) => Err(AppError::Forbidden(
                "admin credentials required".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MemberIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve(parts, state).await? {
            Identity::Member(member) => Ok(member),
            Identity::Admin(_) => Err(AppError::Forbidden(
                "member credentials required".to_string(),
            )),
        }
    }
}
