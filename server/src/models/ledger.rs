use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }
}

/// Append-only record of one balance change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointLedgerEntry {
    pub id: Uuid,
    pub member_id: Uuid,
    pub direction: Direction,
    pub amount: i64,
    pub balance_after: i64,
    pub reason: Option<String>,
    pub token_id: Option<Uuid>,
    pub adjusted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A balance change the store applies atomically against the member row.
#[derive(Debug, Clone)]
pub struct PointChange {
    pub member_id: Uuid,
    pub direction: Direction,
    pub amount: i64,
    pub reason: Option<String>,
    pub adjusted_by: Option<Uuid>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerPage {
    pub entries: Vec<PointLedgerEntry>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}
