use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One-time permission to submit a review, unlocked by a review ticket.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReviewSlot {
    pub id: Uuid,
    pub member_id: Uuid,
    pub token_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub member_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
