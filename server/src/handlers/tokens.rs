use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AdminIdentity, MemberIdentity};
use crate::services::IssueRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    /// Raw token value or the full scanned QR payload.
    pub token: String,
}

pub async fn issue_token(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(request): Json<IssueRequest>,
) -> Result<Response, AppError> {
    let issued = state.issuer.issue(&admin, request).await?;
    Ok(created(issued, "Action token issued").into_response())
}

pub async fn token_status(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(token_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let token = state.issuer.status(token_id).await?;
    Ok(success(token, "Token status").into_response())
}

pub async fn redeem_token(
    State(state): State<AppState>,
    member: MemberIdentity,
    Json(body): Json<RedeemBody>,
) -> Result<Response, AppError> {
    let result = state.redeemer.redeem(&body.token, &member).await?;
    Ok(success(result, "Token redeemed").into_response())
}
