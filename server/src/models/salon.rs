use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
}

/// Weekly recurring window. `weekday` counts from Monday = 0.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffSchedule {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub weekday: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Date-specific override. Both times absent means unavailable all day.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffException {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl StaffException {
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    /// Cancelled and no-show bookings leave the staff free.
    pub fn occupies_time(self) -> bool {
        !matches!(self, ReservationStatus::Cancelled | ReservationStatus::NoShow)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub service_id: Uuid,
    pub member_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub staff_id: Uuid,
    pub service_id: Uuid,
    pub member_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupying_statuses() {
        assert!(ReservationStatus::Pending.occupies_time());
        assert!(ReservationStatus::InProgress.occupies_time());
        assert!(!ReservationStatus::Cancelled.occupies_time());
        assert!(!ReservationStatus::NoShow.occupies_time());
    }

    #[test]
    fn test_exception_without_times_is_unavailable() {
        let exception = StaffException {
            id: Uuid::new_v4(),
            staff_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: None,
            end_time: None,
        };
        assert!(exception.window().is_none());
    }
}
