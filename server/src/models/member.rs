use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Points needed to reach each rank above `Regular`.
pub const SILVER_THRESHOLD: i64 = 500;
pub const GOLD_THRESHOLD: i64 = 2_000;
pub const PLATINUM_THRESHOLD: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Regular,
    Silver,
    Gold,
    Platinum,
}

impl Rank {
    pub fn from_points(points: i64) -> Self {
        match points {
            p if p >= PLATINUM_THRESHOLD => Rank::Platinum,
            p if p >= GOLD_THRESHOLD => Rank::Gold,
            p if p >= SILVER_THRESHOLD => Rank::Silver,
            _ => Rank::Regular,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    /// Platform (LINE) user id.
    pub external_id: String,
    pub display_name: String,
    /// Cache of the latest ledger `balance_after`.
    pub points_balance: i64,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn rank(&self) -> Rank {
        Rank::from_points(self.points_balance)
    }
}

/// Member as returned by `/api/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MemberProfile {
    pub id: Uuid,
    pub display_name: String,
    pub points_balance: i64,
    pub rank: Rank,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberProfile {
    fn from(member: Member) -> Self {
        let rank = member.rank();
        Self {
            id: member.id,
            display_name: member.display_name,
            points_balance: member.points_balance,
            rank,
            created_at: member.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_thresholds() {
        assert_eq!(Rank::from_points(0), Rank::Regular);
        assert_eq!(Rank::from_points(499), Rank::Regular);
        assert_eq!(Rank::from_points(500), Rank::Silver);
        assert_eq!(Rank::from_points(1_999), Rank::Silver);
        assert_eq!(Rank::from_points(2_000), Rank::Gold);
        assert_eq!(Rank::from_points(5_000), Rank::Platinum);
    }
}
