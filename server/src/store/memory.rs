//! In-process store with the same atomicity contract as [`super::PgStore`].
//!
//! One mutex guards the whole state, so each trait method is a single
//! critical section. Used by the test suite and by `STORE_BACKEND=memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    MemberStore, NewReview, PointOutcome, RedeemOutcome, RedeemRequest, Redemption,
    ReviewOutcome, SalonStore, SessionStore, StoreError, StoreResult, TokenStore,
};
use crate::models::{
    ActionToken, ApiSession, Direction, Member, NewActionToken, NewReservation, PointChange,
    PointLedgerEntry, Reservation, ReservationStatus, Review, ReviewSlot, Service,
    StaffException, StaffSchedule, TokenKind, TokenStatus,
};

#[derive(Default)]
struct State {
    tokens: HashMap<Uuid, ActionToken>,
    members: HashMap<Uuid, Member>,
    ledger: Vec<PointLedgerEntry>,
    review_slots: HashMap<Uuid, ReviewSlot>,
    reviews: Vec<Review>,
    sessions: HashMap<String, ApiSession>,
    services: HashMap<Uuid, Service>,
    schedules: Vec<StaffSchedule>,
    exceptions: Vec<StaffException>,
    reservations: Vec<Reservation>,
}

impl State {
    /// Appends a ledger entry and moves the cached balance.
    /// `Ok(Err(balance))` means the debit would overdraw; nothing was written.
    fn append_ledger(
        &mut self,
        change: &PointChange,
        token_id: Option<Uuid>,
    ) -> StoreResult<Result<PointLedgerEntry, i64>> {
        let balance = self
            .members
            .get(&change.member_id)
            .map(|m| m.points_balance)
            .ok_or_else(|| StoreError::NotFound(format!("member {}", change.member_id)))?;

        let latest = self
            .ledger
            .iter()
            .rev()
            .find(|e| e.member_id == change.member_id)
            .map(|e| e.balance_after)
            .unwrap_or(0);
        if latest != balance {
            return Err(StoreError::Invariant(format!(
                "member {} balance {} differs from ledger {}",
                change.member_id, balance, latest
            )));
        }

        let next = balance + change.direction.signed(change.amount);
        if next < 0 {
            return Ok(Err(balance));
        }

        let entry = PointLedgerEntry {
            id: Uuid::new_v4(),
            member_id: change.member_id,
            direction: change.direction,
            amount: change.amount,
            balance_after: next,
            reason: change.reason.clone(),
            token_id,
            adjusted_by: change.adjusted_by,
            created_at: change.at,
        };
        self.ledger.push(entry.clone());
        if let Some(member) = self.members.get_mut(&change.member_id) {
            member.points_balance = next;
        }
        Ok(Ok(entry))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, member: Member) {
        self.state.lock().members.insert(member.id, member);
    }

    pub fn add_session(&self, session: ApiSession) {
        self.state
            .lock()
            .sessions
            .insert(session.token_hash.clone(), session);
    }

    pub fn add_service(&self, service: Service) {
        self.state.lock().services.insert(service.id, service);
    }

    pub fn add_schedule(&self, schedule: StaffSchedule) {
        self.state.lock().schedules.push(schedule);
    }

    pub fn add_exception(&self, exception: StaffException) {
        self.state.lock().exceptions.push(exception);
    }

    pub fn add_reservation(&self, reservation: Reservation) {
        self.state.lock().reservations.push(reservation);
    }

    /// Overwrites a cached balance without a ledger entry. Only useful for
    /// exercising the invariant check.
    #[cfg(test)]
    pub(crate) fn corrupt_balance(&self, member_id: Uuid, balance: i64) {
        if let Some(member) = self.state.lock().members.get_mut(&member_id) {
            member.points_balance = balance;
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: NewActionToken) -> StoreResult<ActionToken> {
        let token = token.into_token();
        self.state.lock().tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_token(&self, id: Uuid) -> StoreResult<Option<ActionToken>> {
        Ok(self.state.lock().tokens.get(&id).cloned())
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> StoreResult<Option<ActionToken>> {
        Ok(self
            .state
            .lock()
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn expire_token(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.tokens.get_mut(&id) {
            Some(token) if token.status == TokenStatus::Pending && token.is_past_expiry(now) => {
                token.status = TokenStatus::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn redeem_token(&self, request: RedeemRequest) -> StoreResult<RedeemOutcome> {
        let mut state = self.state.lock();

        let token = state
            .tokens
            .get(&request.token_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("token {}", request.token_id)))?;

        if token.status != TokenStatus::Pending {
            return Ok(RedeemOutcome::AlreadyUsed);
        }
        if token.is_past_expiry(request.now) {
            if let Some(stored) = state.tokens.get_mut(&token.id) {
                stored.status = TokenStatus::Expired;
            }
            return Ok(RedeemOutcome::Expired);
        }
        if matches!(token.target_member_id, Some(target) if target != request.member_id) {
            return Ok(RedeemOutcome::MemberMismatch);
        }
        if !state.members.contains_key(&request.member_id) {
            return Err(StoreError::NotFound(format!("member {}", request.member_id)));
        }

        let mut entry = None;
        let mut review_slot = None;
        match token.kind {
            TokenKind::EarnPoints | TokenKind::SpendPoints => {
                let amount = token.amount.ok_or_else(|| {
                    StoreError::Invariant(format!("token {} has no amount", token.id))
                })?;
                let direction = if token.kind == TokenKind::EarnPoints {
                    Direction::Credit
                } else {
                    Direction::Debit
                };
                let change = PointChange {
                    member_id: request.member_id,
                    direction,
                    amount,
                    reason: token.reason.clone(),
                    adjusted_by: None,
                    at: request.now,
                };
                match state.append_ledger(&change, Some(token.id))? {
                    Ok(applied) => entry = Some(applied),
                    Err(balance) => return Ok(RedeemOutcome::InsufficientBalance { balance }),
                }
            }
            TokenKind::ReviewTicket => {
                let slot = ReviewSlot {
                    id: Uuid::new_v4(),
                    member_id: request.member_id,
                    token_id: token.id,
                    created_at: request.now,
                    used_at: None,
                };
                state.review_slots.insert(slot.id, slot.clone());
                review_slot = Some(slot);
            }
            TokenKind::Admin2faSession => {}
        }

        let balance = state
            .members
            .get(&request.member_id)
            .map(|m| m.points_balance)
            .unwrap_or_default();

        let stored = state
            .tokens
            .get_mut(&token.id)
            .ok_or_else(|| StoreError::Invariant(format!("token {} vanished", token.id)))?;
        stored.status = TokenStatus::Completed;
        stored.redeemed_by = Some(request.member_id);
        stored.completed_at = Some(request.now);

        Ok(RedeemOutcome::Completed(Redemption {
            token: stored.clone(),
            entry,
            review_slot,
            balance,
        }))
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let mut swept = 0;
        for token in state.tokens.values_mut() {
            if token.status == TokenStatus::Pending && token.is_past_expiry(now) {
                token.status = TokenStatus::Expired;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn find_member(&self, id: Uuid) -> StoreResult<Option<Member>> {
        Ok(self.state.lock().members.get(&id).cloned())
    }

    async fn upsert_member(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Member> {
        let mut state = self.state.lock();
        if let Some(member) = state
            .members
            .values_mut()
            .find(|m| m.external_id == external_id)
        {
            member.display_name = display_name.to_string();
            return Ok(member.clone());
        }

        let member = Member {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            points_balance: 0,
            created_at: now,
        };
        state.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn apply_point_change(&self, change: PointChange) -> StoreResult<PointOutcome> {
        let mut state = self.state.lock();
        Ok(match state.append_ledger(&change, None)? {
            Ok(entry) => PointOutcome::Applied(entry),
            Err(balance) => PointOutcome::InsufficientBalance { balance },
        })
    }

    async fn list_ledger(
        &self,
        member_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<PointLedgerEntry>, i64)> {
        let state = self.state.lock();
        let entries: Vec<&PointLedgerEntry> = state
            .ledger
            .iter()
            .rev()
            .filter(|e| e.member_id == member_id)
            .collect();
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn list_open_review_slots(&self, member_id: Uuid) -> StoreResult<Vec<ReviewSlot>> {
        let state = self.state.lock();
        let mut slots: Vec<ReviewSlot> = state
            .review_slots
            .values()
            .filter(|s| s.member_id == member_id && s.used_at.is_none())
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.created_at);
        Ok(slots)
    }

    async fn submit_review(&self, review: NewReview) -> StoreResult<ReviewOutcome> {
        let mut state = self.state.lock();
        let slot = match state.review_slots.get_mut(&review.slot_id) {
            Some(slot) if slot.member_id == review.member_id => slot,
            _ => return Ok(ReviewOutcome::SlotNotFound),
        };
        if slot.used_at.is_some() {
            return Ok(ReviewOutcome::SlotUsed);
        }
        slot.used_at = Some(review.at);

        let stored = Review {
            id: Uuid::new_v4(),
            slot_id: review.slot_id,
            member_id: review.member_id,
            rating: review.rating,
            comment: review.comment,
            created_at: review.at,
        };
        state.reviews.push(stored.clone());
        Ok(ReviewOutcome::Submitted(stored))
    }
}

#[async_trait]
impl SalonStore for MemoryStore {
    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        Ok(self.state.lock().services.get(&id).cloned())
    }

    async fn find_schedule(
        &self,
        staff_id: Uuid,
        weekday: i16,
    ) -> StoreResult<Option<StaffSchedule>> {
        Ok(self
            .state
            .lock()
            .schedules
            .iter()
            .find(|s| s.staff_id == staff_id && s.weekday == weekday)
            .cloned())
    }

    async fn find_exception(
        &self,
        staff_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Option<StaffException>> {
        Ok(self
            .state
            .lock()
            .exceptions
            .iter()
            .find(|e| e.staff_id == staff_id && e.date == date)
            .cloned())
    }

    async fn list_reservations(
        &self,
        staff_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .state
            .lock()
            .reservations
            .iter()
            .filter(|r| r.staff_id == staff_id && r.date == date)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.start_time);
        Ok(reservations)
    }

    async fn insert_reservation(&self, reservation: NewReservation) -> StoreResult<Reservation> {
        let mut state = self.state.lock();
        let overlaps = state.reservations.iter().any(|r| {
            r.staff_id == reservation.staff_id
                && r.date == reservation.date
                && r.status.occupies_time()
                && r.start_time < reservation.end_time
                && reservation.start_time < r.end_time
        });
        if overlaps {
            return Err(StoreError::Overlap);
        }

        let stored = Reservation {
            id: Uuid::new_v4(),
            staff_id: reservation.staff_id,
            service_id: reservation.service_id,
            member_id: reservation.member_id,
            date: reservation.date,
            start_time: reservation.start_time,
            end_time: reservation.end_time,
            status: ReservationStatus::Pending,
            created_at: reservation.created_at,
        };
        state.reservations.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<ApiSession>> {
        Ok(self.state.lock().sessions.get(token_hash).cloned())
    }
}
