use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Effect an action token grants when it is redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EarnPoints,
    SpendPoints,
    ReviewTicket,
    #[sqlx(rename = "admin_2fa_session")]
    #[serde(rename = "admin_2fa_session")]
    Admin2faSession,
}

impl TokenKind {
    /// Whether the token carries a point amount.
    pub fn moves_points(self) -> bool {
        matches!(self, TokenKind::EarnPoints | TokenKind::SpendPoints)
    }

    /// Kinds that must name their member when issued.
    pub fn requires_bound_member(self) -> bool {
        matches!(self, TokenKind::Admin2faSession)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::EarnPoints => "earn_points",
            TokenKind::SpendPoints => "spend_points",
            TokenKind::ReviewTicket => "review_ticket",
            TokenKind::Admin2faSession => "admin_2fa_session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Pending,
    Completed,
    Expired,
}

/// Persisted action token. The external value is never stored, only its hash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionToken {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub kind: TokenKind,
    pub issued_by: Uuid,
    pub target_member_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub status: TokenStatus,
    pub redeemed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActionToken {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Row the issuer hands to the store.
#[derive(Debug, Clone)]
pub struct NewActionToken {
    pub id: Uuid,
    pub token_hash: String,
    pub kind: TokenKind,
    pub issued_by: Uuid,
    pub target_member_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewActionToken {
    pub fn into_token(self) -> ActionToken {
        ActionToken {
            id: self.id,
            token_hash: self.token_hash,
            kind: self.kind,
            issued_by: self.issued_by,
            target_member_id: self.target_member_id,
            amount: self.amount,
            reason: self.reason,
            status: TokenStatus::Pending,
            redeemed_by: None,
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: None,
        }
    }
}

/// Default lifetime of a freshly issued token, per kind.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub earn_points: Duration,
    pub spend_points: Duration,
    pub review_ticket: Duration,
    pub admin_2fa_session: Duration,
    pub max_ttl: Duration,
}

impl TtlPolicy {
    pub fn default_for(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::EarnPoints => self.earn_points,
            TokenKind::SpendPoints => self.spend_points,
            TokenKind::ReviewTicket => self.review_ticket,
            TokenKind::Admin2faSession => self.admin_2fa_session,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            earn_points: Duration::minutes(10),
            spend_points: Duration::minutes(5),
            review_ticket: Duration::minutes(30),
            admin_2fa_session: Duration::minutes(5),
            max_ttl: Duration::hours(24),
        }
    }
}
