//! Persistence boundary.
//!
//! Every operation that must be atomic (redemption, point changes, review
//! submission, reservation insert) is a single trait method, so each backend
//! can implement it as one transaction or one critical section.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActionToken, ApiSession, Member, NewActionToken, NewReservation, PointChange,
    PointLedgerEntry, Reservation, Review, ReviewSlot, Service, StaffException, StaffSchedule,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    #[error("contention: {0}")]
    Contention(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("reservation overlaps an occupying reservation")]
    Overlap,

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// SQLSTATEs that mean "try again": serialization failure, deadlock, lock timeout.
const RETRYABLE_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];
const EXCLUSION_VIOLATION: &str = "23P01";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return StoreError::Timeout;
        }
        let code = err
            .as_database_error()
            .and_then(|db| db.code().map(|code| code.into_owned()));
        match code.as_deref() {
            Some(code) if RETRYABLE_SQLSTATES.contains(&code) => {
                StoreError::Contention(err.to_string())
            }
            Some(EXCLUSION_VIOLATION) => StoreError::Overlap,
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Runs a store call with an upper bound on its duration.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub token_id: Uuid,
    pub member_id: Uuid,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Redemption {
    pub token: ActionToken,
    pub entry: Option<PointLedgerEntry>,
    pub review_slot: Option<ReviewSlot>,
    pub balance: i64,
}

#[derive(Debug, Clone)]
pub enum RedeemOutcome {
    Completed(Redemption),
    AlreadyUsed,
    /// The token was pending but past its expiry; it is now marked expired.
    Expired,
    MemberMismatch,
    InsufficientBalance { balance: i64 },
}

#[derive(Debug, Clone)]
pub enum PointOutcome {
    Applied(PointLedgerEntry),
    InsufficientBalance { balance: i64 },
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub slot_id: Uuid,
    pub member_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Submitted(Review),
    SlotNotFound,
    SlotUsed,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: NewActionToken) -> StoreResult<ActionToken>;

    async fn find_token(&self, id: Uuid) -> StoreResult<Option<ActionToken>>;

    async fn find_token_by_hash(&self, token_hash: &str) -> StoreResult<Option<ActionToken>>;

    /// Pending -> expired when `now` is past expiry. Returns whether a row changed.
    async fn expire_token(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Status check, transition and effect in one atomic unit.
    async fn redeem_token(&self, request: RedeemRequest) -> StoreResult<RedeemOutcome>;

    /// Marks every overdue pending token as expired.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_member(&self, id: Uuid) -> StoreResult<Option<Member>>;

    async fn upsert_member(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Member>;

    async fn apply_point_change(&self, change: PointChange) -> StoreResult<PointOutcome>;

    /// Newest first.
    async fn list_ledger(
        &self,
        member_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<PointLedgerEntry>, i64)>;

    async fn list_open_review_slots(&self, member_id: Uuid) -> StoreResult<Vec<ReviewSlot>>;

    async fn submit_review(&self, review: NewReview) -> StoreResult<ReviewOutcome>;
}

#[async_trait]
pub trait SalonStore: Send + Sync {
    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>>;

    async fn find_schedule(&self, staff_id: Uuid, weekday: i16)
        -> StoreResult<Option<StaffSchedule>>;

    async fn find_exception(
        &self,
        staff_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Option<StaffException>>;

    async fn list_reservations(&self, staff_id: Uuid, date: NaiveDate)
        -> StoreResult<Vec<Reservation>>;

    /// Fails with [`StoreError::Overlap`] if an occupying reservation intersects.
    async fn insert_reservation(&self, reservation: NewReservation) -> StoreResult<Reservation>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<ApiSession>>;
}

pub trait Store: TokenStore + MemberStore + SalonStore + SessionStore {}

impl<T> Store for T where T: TokenStore + MemberStore + SalonStore + SessionStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: StoreResult<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
