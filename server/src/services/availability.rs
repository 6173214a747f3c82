//! Free slots for one staff member on one day.
//!
//! All arithmetic is done in whole minutes since midnight. Slot starts sit on
//! multiples of the granularity; a slot is offered only when the full service
//! duration fits inside one free interval.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use uuid::Uuid;

use super::StoreContext;
use crate::store::SalonStore;
use crate::utils::error::AppError;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

fn minute_floor(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn minute_ceil(time: NaiveTime) -> u32 {
    (time.num_seconds_from_midnight() + 59) / 60
}

fn time_at(minute: u32) -> Option<NaiveTime> {
    if minute >= MINUTES_PER_DAY {
        return None;
    }
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
}

/// Bookable slots for a day. Iterating borrows, so the sequence can be
/// walked any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slots {
    free: Vec<(u32, u32)>,
    duration: u32,
    granularity: u32,
}

impl Slots {
    pub fn empty() -> Self {
        Self {
            free: Vec::new(),
            duration: 1,
            granularity: 1,
        }
    }

    /// `window` is the working window for the day (`None` = unavailable);
    /// `occupied` are the intervals taken by occupying reservations.
    pub fn compute(
        window: Option<(NaiveTime, NaiveTime)>,
        occupied: &[(NaiveTime, NaiveTime)],
        duration_minutes: u32,
        granularity_minutes: u32,
    ) -> Self {
        let Some((open, close)) = window else {
            return Self::empty();
        };
        let (open, close) = (minute_ceil(open), minute_floor(close));
        if open >= close || duration_minutes == 0 {
            return Self::empty();
        }

        let mut busy: Vec<(u32, u32)> = occupied
            .iter()
            .map(|(start, end)| (minute_floor(*start), minute_ceil(*end)))
            .filter(|(start, end)| start < end)
            .collect();
        busy.sort_unstable();

        let mut free = Vec::new();
        let mut cursor = open;
        for (start, end) in busy {
            if end <= cursor {
                continue;
            }
            if start >= close {
                break;
            }
            if start > cursor {
                free.push((cursor, start));
            }
            cursor = cursor.max(end);
        }
        if cursor < close {
            free.push((cursor, close));
        }

        Self {
            free,
            duration: duration_minutes,
            granularity: granularity_minutes.max(1),
        }
    }

    pub fn iter(&self) -> SlotIter<'_> {
        SlotIter {
            slots: self,
            interval: 0,
            next_start: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn contains_start(&self, start: NaiveTime) -> bool {
        self.iter().any(|slot| slot.start == start)
    }
}

impl<'a> IntoIterator for &'a Slots {
    type Item = TimeSlot;
    type IntoIter = SlotIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazily walks the grid across each free interval in order.
#[derive(Debug, Clone)]
pub struct SlotIter<'a> {
    slots: &'a Slots,
    interval: usize,
    next_start: Option<u32>,
}

impl Iterator for SlotIter<'_> {
    type Item = TimeSlot;

    fn next(&mut self) -> Option<TimeSlot> {
        let step = self.slots.granularity;
        while let Some(&(from, to)) = self.slots.free.get(self.interval) {
            let start = match self.next_start {
                Some(start) => start,
                None => from.div_ceil(step) * step,
            };
            let end = start + self.slots.duration;
            if end <= to {
                self.next_start = Some(start + step);
                if let (Some(start), Some(end)) = (time_at(start), time_at(end)) {
                    return Some(TimeSlot { start, end });
                }
                continue;
            }
            self.interval += 1;
            self.next_start = None;
        }
        None
    }
}

pub struct AvailabilityCalculator {
    ctx: StoreContext,
    granularity_minutes: u32,
}

impl AvailabilityCalculator {
    pub fn new(ctx: StoreContext, granularity_minutes: u32) -> Self {
        Self {
            ctx,
            granularity_minutes,
        }
    }

    pub async fn availability(
        &self,
        staff_id: Uuid,
        service_id: Uuid,
        date: NaiveDate,
    ) -> Result<Slots, AppError> {
        let service = self
            .ctx
            .call(self.ctx.store.find_service(service_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;
        let duration = u32::try_from(service.duration_minutes)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| {
                AppError::Fatal(format!("service {service_id} has a non-positive duration"))
            })?;

        // A date-specific exception replaces the weekly template outright.
        let window = match self
            .ctx
            .call(self.ctx.store.find_exception(staff_id, date))
            .await?
        {
            Some(exception) => exception.window(),
            None => {
                let weekday = date.weekday().num_days_from_monday() as i16;
                self.ctx
                    .call(self.ctx.store.find_schedule(staff_id, weekday))
                    .await?
                    .map(|schedule| (schedule.start_time, schedule.end_time))
            }
        };
        if window.is_none() {
            return Ok(Slots::empty());
        }

        let occupied: Vec<(NaiveTime, NaiveTime)> = self
            .ctx
            .call(self.ctx.store.list_reservations(staff_id, date))
            .await?
            .into_iter()
            .filter(|r| r.status.occupies_time())
            .map(|r| (r.start_time, r.end_time))
            .collect();

        Ok(Slots::compute(
            window,
            &occupied,
            duration,
            self.granularity_minutes,
        ))
    }
}
