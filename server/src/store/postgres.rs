//! PostgreSQL store.
//!
//! Redemption locks the token row (`FOR UPDATE`) and then the member row, and
//! finishes with a conditional `status = 'pending'` update. Point adjustments
//! lock only the member row, so lock order is always token before member.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{
    MemberStore, NewReview, PointOutcome, RedeemOutcome, RedeemRequest, Redemption,
    ReviewOutcome, SalonStore, SessionStore, StoreError, StoreResult, TokenStore,
};
use crate::config::Config;
use crate::models::{
    ActionToken, ApiSession, Direction, Member, NewActionToken, NewReservation, PointChange,
    PointLedgerEntry, Reservation, Review, ReviewSlot, Service, StaffException, StaffSchedule,
    TokenKind, TokenStatus,
};

const TOKEN_COLUMNS: &str = "id, token_hash, kind, issued_by, target_member_id, amount, reason, \
     status, redeemed_by, created_at, expires_at, completed_at";

const LEDGER_COLUMNS: &str =
    "id, member_id, direction, amount, balance_after, reason, token_id, adjusted_by, created_at";

const MEMBER_COLUMNS: &str = "id, external_id, display_name, points_balance, created_at";

const RESERVATION_COLUMNS: &str =
    "id, staff_id, service_id, member_id, date, start_time, end_time, status, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL must be set".into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.store_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

/// Appends a ledger entry inside `tx` after locking the member row.
/// `Ok(Err(balance))` means the debit would overdraw; the caller rolls back.
async fn append_ledger(
    tx: &mut Transaction<'_, Postgres>,
    change: &PointChange,
    token_id: Option<Uuid>,
) -> StoreResult<Result<PointLedgerEntry, i64>> {
    let balance: Option<i64> =
        sqlx::query_scalar("SELECT points_balance FROM members WHERE id = $1 FOR UPDATE")
            .bind(change.member_id)
            .fetch_optional(&mut **tx)
            .await?;
    let balance =
        balance.ok_or_else(|| StoreError::NotFound(format!("member {}", change.member_id)))?;

    let latest: Option<i64> = sqlx::query_scalar(
        "SELECT balance_after FROM point_ledger WHERE member_id = $1 ORDER BY seq DESC LIMIT 1",
    )
    .bind(change.member_id)
    .fetch_optional(&mut **tx)
    .await?;
    let latest = latest.unwrap_or(0);
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

    let entry = sqlx::query_as::<_, PointLedgerEntry>(&format!(
        "INSERT INTO point_ledger (id, member_id, direction, amount, balance_after, reason, token_id, adjusted_by, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {LEDGER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(change.member_id)
    .bind(change.direction)
    .bind(change.amount)
    .bind(next)
    .bind(&change.reason)
    .bind(token_id)
    .bind(change.adjusted_by)
    .bind(change.at)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("UPDATE members SET points_balance = $1 WHERE id = $2")
        .bind(next)
        .bind(change.member_id)
        .execute(&mut **tx)
        .await?;

    Ok(Ok(entry))
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: NewActionToken) -> StoreResult<ActionToken> {
        let token = sqlx::query_as::<_, ActionToken>(&format!(
            "INSERT INTO action_tokens (id, token_hash, kind, issued_by, target_member_id, amount, reason, status, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9) RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.kind)
        .bind(token.issued_by)
        .bind(token.target_member_id)
        .bind(token.amount)
        .bind(&token.reason)
        .bind(token.created_at)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(token)
    }

    async fn find_token(&self, id: Uuid) -> StoreResult<Option<ActionToken>> {
        let token = sqlx::query_as::<_, ActionToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM action_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn find_token_by_hash(&self, token_hash: &str) -> StoreResult<Option<ActionToken>> {
        let token = sqlx::query_as::<_, ActionToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM action_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn expire_token(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE action_tokens SET status = 'expired' \
             WHERE id = $1 AND status = 'pending' AND expires_at < $2",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn redeem_token(&self, request: RedeemRequest) -> StoreResult<RedeemOutcome> {
        let mut tx = self.pool.begin().await?;

        let token = sqlx::query_as::<_, ActionToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM action_tokens WHERE id = $1 FOR UPDATE"
        ))
        .bind(request.token_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("token {}", request.token_id)))?;

        if token.status != TokenStatus::Pending {
            return Ok(RedeemOutcome::AlreadyUsed);
        }
        if token.is_past_expiry(request.now) {
            sqlx::query(
                "UPDATE action_tokens SET status = 'expired' WHERE id = $1 AND status = 'pending'",
            )
            .bind(token.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(RedeemOutcome::Expired);
        }
        if matches!(token.target_member_id, Some(target) if target != request.member_id) {
            return Ok(RedeemOutcome::MemberMismatch);
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
                match append_ledger(&mut tx, &change, Some(token.id)).await? {
                    Ok(applied) => entry = Some(applied),
                    // Dropping `tx` rolls back; the token stays pending.
                    Err(balance) => return Ok(RedeemOutcome::InsufficientBalance { balance }),
                }
            }
            TokenKind::ReviewTicket => {
                let slot = sqlx::query_as::<_, ReviewSlot>(
                    "INSERT INTO review_slots (id, member_id, token_id, created_at) \
                     VALUES ($1, $2, $3, $4) RETURNING id, member_id, token_id, created_at, used_at",
                )
                .bind(Uuid::new_v4())
                .bind(request.member_id)
                .bind(token.id)
                .bind(request.now)
                .fetch_one(&mut *tx)
                .await?;
                review_slot = Some(slot);
            }
            TokenKind::Admin2faSession => {}
        }

        let balance: Option<i64> =
            sqlx::query_scalar("SELECT points_balance FROM members WHERE id = $1")
                .bind(request.member_id)
                .fetch_optional(&mut *tx)
                .await?;
        let balance =
            balance.ok_or_else(|| StoreError::NotFound(format!("member {}", request.member_id)))?;

        let completed = sqlx::query_as::<_, ActionToken>(&format!(
            "UPDATE action_tokens SET status = 'completed', redeemed_by = $2, completed_at = $3 \
             WHERE id = $1 AND status = 'pending' RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(token.id)
        .bind(request.member_id)
        .bind(request.now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(completed) = completed else {
            return Ok(RedeemOutcome::AlreadyUsed);
        };

        tx.commit().await?;

        Ok(RedeemOutcome::Completed(Redemption {
            token: completed,
            entry,
            review_slot,
            balance,
        }))
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE action_tokens SET status = 'expired' WHERE status = 'pending' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MemberStore for PgStore {
    async fn find_member(&self, id: Uuid) -> StoreResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn upsert_member(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Member> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "INSERT INTO members (id, external_id, display_name, points_balance, created_at) \
             VALUES ($1, $2, $3, 0, $4) \
             ON CONFLICT (external_id) DO UPDATE SET display_name = EXCLUDED.display_name \
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(external_id)
        .bind(display_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(member)
    }

    async fn apply_point_change(&self, change: PointChange) -> StoreResult<PointOutcome> {
        let mut tx = self.pool.begin().await?;
        match append_ledger(&mut tx, &change, None).await? {
            Ok(entry) => {
                tx.commit().await?;
                Ok(PointOutcome::Applied(entry))
            }
            Err(balance) => Ok(PointOutcome::InsufficientBalance { balance }),
        }
    }

    async fn list_ledger(
        &self,
        member_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<PointLedgerEntry>, i64)> {
        let entries = sqlx::query_as::<_, PointLedgerEntry>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM point_ledger WHERE member_id = $1 \
             ORDER BY seq DESC LIMIT $2 OFFSET $3"
        ))
        .bind(member_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM point_ledger WHERE member_id = $1")
                .bind(member_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((entries, total))
    }

    async fn list_open_review_slots(&self, member_id: Uuid) -> StoreResult<Vec<ReviewSlot>> {
        let slots = sqlx::query_as::<_, ReviewSlot>(
            "SELECT id, member_id, token_id, created_at, used_at FROM review_slots \
             WHERE member_id = $1 AND used_at IS NULL ORDER BY created_at",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    async fn submit_review(&self, review: NewReview) -> StoreResult<ReviewOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE review_slots SET used_at = $3 WHERE id = $1 AND member_id = $2 AND used_at IS NULL",
        )
        .bind(review.slot_id)
        .bind(review.member_id)
        .bind(review.at)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM review_slots WHERE id = $1 AND member_id = $2")
                    .bind(review.slot_id)
                    .bind(review.member_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Ok(match exists {
                Some(_) => ReviewOutcome::SlotUsed,
                None => ReviewOutcome::SlotNotFound,
            });
        }

        let stored = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (id, slot_id, member_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, slot_id, member_id, rating, comment, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(review.slot_id)
        .bind(review.member_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReviewOutcome::Submitted(stored))
    }
}

#[async_trait]
impl SalonStore for PgStore {
    async fn find_service(&self, id: Uuid) -> StoreResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT id, name, duration_minutes FROM services WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(service)
    }

    async fn find_schedule(
        &self,
        staff_id: Uuid,
        weekday: i16,
    ) -> StoreResult<Option<StaffSchedule>> {
        let schedule = sqlx::query_as::<_, StaffSchedule>(
            "SELECT id, staff_id, weekday, start_time, end_time FROM staff_schedules \
             WHERE staff_id = $1 AND weekday = $2",
        )
        .bind(staff_id)
        .bind(weekday)
        .fetch_optional(&self.pool)
        .await?;
        Ok(schedule)
    }

    async fn find_exception(
        &self,
        staff_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Option<StaffException>> {
        let exception = sqlx::query_as::<_, StaffException>(
            "SELECT id, staff_id, date, start_time, end_time FROM staff_exceptions \
             WHERE staff_id = $1 AND date = $2",
        )
        .bind(staff_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exception)
    }

    async fn list_reservations(
        &self,
        staff_id: Uuid,
        date: NaiveDate,
    ) -> StoreResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE staff_id = $1 AND date = $2 ORDER BY start_time"
        ))
        .bind(staff_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    async fn insert_reservation(&self, reservation: NewReservation) -> StoreResult<Reservation> {
        // `reservations_no_overlap` rejects concurrent inserts that both pass NOT EXISTS.
        let stored = sqlx::query_as::<_, Reservation>(&format!(
            "INSERT INTO reservations (id, staff_id, service_id, member_id, date, start_time, end_time, status, created_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, 'pending', $8 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM reservations \
                 WHERE staff_id = $2 AND date = $5 \
                   AND status NOT IN ('cancelled', 'no_show') \
                   AND start_time < $7 AND $6 < end_time) \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(reservation.staff_id)
        .bind(reservation.service_id)
        .bind(reservation.member_id)
        .bind(reservation.date)
        .bind(reservation.start_time)
        .bind(reservation.end_time)
        .bind(reservation.created_at)
        .fetch_optional(&self.pool)
        .await?;

        stored.ok_or(StoreError::Overlap)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_session(&self, token_hash: &str) -> StoreResult<Option<ApiSession>> {
        let session = sqlx::query_as::<_, ApiSession>(
            "SELECT token_hash, kind, subject_id, role, expires_at FROM api_sessions \
             WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }
}
