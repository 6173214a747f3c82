use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::MemberIdentity;
use crate::services::{BookingRequest, TimeSlot};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::{Json, Path, Query};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: Uuid,
    pub date: NaiveDate,
}

pub async fn availability(
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Response, AppError> {
    let slots = state
        .availability()
        .availability(staff_id, query.service_id, query.date)
        .await?;
    let slots: Vec<TimeSlot> = slots.iter().collect();
    Ok(success(slots, "Available slots").into_response())
}

pub async fn book_reservation(
    State(state): State<AppState>,
    member: MemberIdentity,
    Json(request): Json<BookingRequest>,
) -> Result<Response, AppError> {
    let reservation = state.reservations.book(&member, request).await?;
    Ok(created(reservation, "Reservation booked").into_response())
}
