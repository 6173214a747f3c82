use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{AvailabilityCalculator, StoreContext};
use crate::auth::MemberIdentity;
use crate::models::{NewReservation, Reservation};
use crate::store::SalonStore;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub staff_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

pub struct ReservationService {
    ctx: StoreContext,
    availability: AvailabilityCalculator,
}

impl ReservationService {
    pub fn new(ctx: StoreContext, granularity_minutes: u32) -> Self {
        Self {
            availability: AvailabilityCalculator::new(ctx.clone(), granularity_minutes),
            ctx,
        }
    }

    pub fn availability(&self) -> &AvailabilityCalculator {
        &self.availability
    }

    /// Books one of the offered slots. The store re-checks overlap atomically,
    /// so two members racing for the same slot get one booking and one
    /// `SlotUnavailable`.
    pub async fn book(
        &self,
        member: &MemberIdentity,
        request: BookingRequest,
    ) -> Result<Reservation, AppError> {
        // Salon-local wall time is taken to be the service clock's UTC time.
        let now = self.ctx.now().naive_utc();
        if request.date < now.date() {
            return Err(AppError::ValidationError(
                "cannot book a past date".to_string(),
            ));
        }
        if request.date == now.date() && request.start_time <= now.time() {
            return Err(AppError::ValidationError(
                "cannot book a slot that has already started".to_string(),
            ));
        }

        let service = self
            .ctx
            .call(self.ctx.store.find_service(request.service_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("service {}", request.service_id)))?;

        let slots = self
            .availability
            .availability(request.staff_id, request.service_id, request.date)
            .await?;
        if !slots.contains_start(request.start_time) {
            return Err(AppError::SlotUnavailable(format!(
                "{} {} is not an offered slot",
                request.date, request.start_time
            )));
        }

        let (end_time, wrapped) = request
            .start_time
            .overflowing_add_signed(Duration::minutes(i64::from(service.duration_minutes)));
        if wrapped != 0 {
            return Err(AppError::SlotUnavailable(
                "service would run past midnight".to_string(),
            ));
        }

        let reservation = self
            .ctx
            .call(self.ctx.store.insert_reservation(NewReservation {
                staff_id: request.staff_id,
                service_id: request.service_id,
                member_id: Some(member.member_id),
                date: request.date,
                start_time: request.start_time,
                end_time,
                created_at: self.ctx.now(),
            }))
            .await?;

        info!(
            reservation_id = %reservation.id,
            staff_id = %reservation.staff_id,
            date = %reservation.date,
            start = %reservation.start_time,
            "Reservation booked"
        );
        Ok(reservation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::{ReservationStatus, Service, StaffSchedule};
    use crate::store::MemoryStore;
    use crate::utils::clock::ManualClock;

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn setup_test() -> (ReservationService, Arc<ManualClock>, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ctx = StoreContext::new(store.clone(), clock.clone(), StdDuration::from_secs(1));
        let staff_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        store.add_service(Service {
            id: service_id,
            name: "Color".into(),
            duration_minutes: 90,
        });
        store.add_schedule(StaffSchedule {
            id: Uuid::new_v4(),
            staff_id,
            weekday: 0,
            start_time: t(10, 0),
            end_time: t(19, 0),
        });
        // 2026-03-01 (the clock's date) is a Sunday.
        store.add_schedule(StaffSchedule {
            id: Uuid::new_v4(),
            staff_id,
            weekday: 6,
            start_time: t(10, 0),
            end_time: t(19, 0),
        });
        (ReservationService::new(ctx, 30), clock, staff_id, service_id)
    }

    fn member() -> MemberIdentity {
        MemberIdentity {
            member_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_book_offered_slot_then_slot_disappears() {
        let (service, _clock, staff_id, service_id) = setup_test();
        let request = BookingRequest {
            staff_id,
            service_id,
            date: monday(),
            start_time: t(10, 0),
        };

        let reservation = service.book(&member(), request.clone()).await.unwrap();
        assert_eq!(reservation.end_time, t(11, 30));
        assert_eq!(reservation.status, ReservationStatus::Pending);

        assert!(matches!(
            service.book(&member(), request).await,
            Err(AppError::SlotUnavailable(_))
        ));

        let slots = service
            .availability()
            .availability(staff_id, service_id, monday())
            .await
            .unwrap();
        assert_eq!(slots.iter().next().unwrap().start, t(11, 30));
    }

    #[tokio::test]
    async fn test_rejects_unaligned_and_past_bookings() {
        let (service, _clock, staff_id, service_id) = setup_test();
        let unaligned = BookingRequest {
            staff_id,
            service_id,
            date: monday(),
            start_time: t(10, 15),
        };
        assert!(matches!(
            service.book(&member(), unaligned).await,
            Err(AppError::SlotUnavailable(_))
        ));

        let past = BookingRequest {
            staff_id,
            service_id,
            date: NaiveDate::from_ymd_opt(2026, 2, 23).unwrap(),
            start_time: t(10, 0),
        };
        assert!(matches!(
            service.book(&member(), past).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_slots_that_already_started_today() {
        let (service, clock, staff_id, service_id) = setup_test();
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        clock.advance(Duration::hours(3));

        let started = BookingRequest {
            staff_id,
            service_id,
            date: today,
            start_time: t(11, 0),
        };
        assert!(matches!(
            service.book(&member(), started).await,
            Err(AppError::ValidationError(_))
        ));

        let at_now = BookingRequest {
            staff_id,
            service_id,
            date: today,
            start_time: t(12, 0),
        };
        assert!(matches!(
            service.book(&member(), at_now).await,
            Err(AppError::ValidationError(_))
        ));

        let later = BookingRequest {
            staff_id,
            service_id,
            date: today,
            start_time: t(12, 30),
        };
        let reservation = service.book(&member(), later).await.unwrap();
        assert_eq!(reservation.end_time, t(14, 0));
    }
}
