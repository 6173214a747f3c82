use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AdminIdentity, MemberIdentity};
use crate::services::members::{PointAdjustment, RegisterMember, ReviewSubmission};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path, Query};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn register_member(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Json(request): Json<RegisterMember>,
) -> Result<Response, AppError> {
    let profile = state.members.register(&admin, request).await?;
    Ok(success(profile, "Member registered").into_response())
}

pub async fn adjust_points(
    State(state): State<AppState>,
    admin: AdminIdentity,
    Path(member_id): Path<Uuid>,
    Json(adjustment): Json<PointAdjustment>,
) -> Result<Response, AppError> {
    let entry = state.members.adjust(&admin, member_id, adjustment).await?;
    Ok(created(entry, "Points adjusted").into_response())
}

pub async fn me(
    State(state): State<AppState>,
    member: MemberIdentity,
) -> Result<Response, AppError> {
    let profile = state.members.profile(&member).await?;
    Ok(success(profile, "Member profile").into_response())
}

pub async fn ledger(
    State(state): State<AppState>,
    member: MemberIdentity,
    Query(query): Query<LedgerQuery>,
) -> Result<Response, AppError> {
    let page = state
        .members
        .ledger(&member, query.page, query.per_page)
        .await?;
    Ok(success(page, "Point history").into_response())
}

pub async fn review_slots(
    State(state): State<AppState>,
    member: MemberIdentity,
) -> Result<Response, AppError> {
    let slots = state.members.open_review_slots(&member).await?;
    Ok(success(slots, "Open review slots").into_response())
}

pub async fn submit_review(
    State(state): State<AppState>,
    member: MemberIdentity,
    Json(submission): Json<ReviewSubmission>,
) -> Result<Response, AppError> {
    let review = state.members.submit_review(&member, submission).await?;
    Ok(created(review, "Review submitted").into_response())
}
