use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::StoreContext;
use crate::auth::{AdminIdentity, MemberIdentity};
use crate::models::{
    Direction, LedgerPage, Member, MemberProfile, PointChange, PointLedgerEntry, Review,
    ReviewSlot,
};
use crate::services::issuer::{MAX_POINT_AMOUNT, MAX_REASON_LEN};
use crate::store::{MemberStore, NewReview, PointOutcome, ReviewOutcome};
use crate::utils::error::AppError;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;
pub const MAX_COMMENT_LEN: usize = 1_000;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMember {
    pub external_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointAdjustment {
    pub direction: Direction,
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub slot_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

pub struct MemberService {
    ctx: StoreContext,
}

impl MemberService {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    async fn load(&self, member_id: Uuid) -> Result<Member, AppError> {
        self.ctx
            .call(self.ctx.store.find_member(member_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("member {member_id}")))
    }

    pub async fn profile(&self, member: &MemberIdentity) -> Result<MemberProfile, AppError> {
        self.load(member.member_id).await.map(MemberProfile::from)
    }

    pub async fn ledger(
        &self,
        member: &MemberIdentity,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<LedgerPage, AppError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(AppError::ValidationError("page starts at 1".to_string()));
        }
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(AppError::ValidationError(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }

        let offset = i64::from(page - 1) * i64::from(per_page);
        let (entries, total) = self
            .ctx
            .call(
                self.ctx
                    .store
                    .list_ledger(member.member_id, i64::from(per_page), offset),
            )
            .await?;

        Ok(LedgerPage {
            entries,
            page,
            per_page,
            total,
        })
    }

    pub async fn register(
        &self,
        admin: &AdminIdentity,
        request: RegisterMember,
    ) -> Result<MemberProfile, AppError> {
        let external_id = request.external_id.trim();
        let display_name = request.display_name.trim();
        if external_id.is_empty() || display_name.is_empty() {
            return Err(AppError::ValidationError(
                "external_id and display_name are required".to_string(),
            ));
        }

        let member = self
            .ctx
            .call(
                self.ctx
                    .store
                    .upsert_member(external_id, display_name, self.ctx.now()),
            )
            .await?;
        info!(member_id = %member.id, registered_by = %admin.admin_id, "Member registered");
        Ok(member.into())
    }

    /// Explicit admin credit or debit. Owner role only.
    pub async fn adjust(
        &self,
        admin: &AdminIdentity,
        member_id: Uuid,
        adjustment: PointAdjustment,
    ) -> Result<PointLedgerEntry, AppError> {
        admin.require_owner()?;

        if !(1..=MAX_POINT_AMOUNT).contains(&adjustment.amount) {
            return Err(AppError::ValidationError(format!(
                "amount must be between 1 and {MAX_POINT_AMOUNT}"
            )));
        }
        let reason = adjustment.reason.trim();
        if reason.is_empty() || reason.chars().count() > MAX_REASON_LEN {
            return Err(AppError::ValidationError(format!(
                "reason is required and at most {MAX_REASON_LEN} characters"
            )));
        }

        self.load(member_id).await?;

        let change = PointChange {
            member_id,
            direction: adjustment.direction,
            amount: adjustment.amount,
            reason: Some(reason.to_string()),
            adjusted_by: Some(admin.admin_id),
            at: self.ctx.now(),
        };

        match self.ctx.call(self.ctx.store.apply_point_change(change)).await? {
            PointOutcome::Applied(entry) => {
                info!(
                    member_id = %member_id,
                    admin_id = %admin.admin_id,
                    amount = entry.amount,
                    balance_after = entry.balance_after,
                    "Points adjusted"
                );
                Ok(entry)
            }
            PointOutcome::InsufficientBalance { balance } => Err(AppError::InsufficientBalance {
                balance,
                requested: adjustment.amount,
            }),
        }
    }

    pub async fn open_review_slots(
        &self,
        member: &MemberIdentity,
    ) -> Result<Vec<ReviewSlot>, AppError> {
        self.ctx
            .call(self.ctx.store.list_open_review_slots(member.member_id))
            .await
    }

    pub async fn submit_review(
        &self,
        member: &MemberIdentity,
        submission: ReviewSubmission,
    ) -> Result<Review, AppError> {
        if !(1..=5).contains(&submission.rating) {
            return Err(AppError::ValidationError(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        let comment = submission
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(AppError::ValidationError(format!(
                "comment must be at most {MAX_COMMENT_LEN} characters"
            )));
        }

        let review = NewReview {
            slot_id: submission.slot_id,
            member_id: member.member_id,
            rating: submission.rating,
            comment,
            at: self.ctx.now(),
        };

        match self.ctx.call(self.ctx.store.submit_review(review)).await? {
            ReviewOutcome::Submitted(review) => Ok(review),
            ReviewOutcome::SlotUsed => Err(AppError::AlreadyUsed),
            ReviewOutcome::SlotNotFound => Err(AppError::NotFound(format!(
                "review slot {}",
                submission.slot_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::models::{AdminRole, Rank, TokenKind, TtlPolicy};
    use crate::services::{IssueRequest, TokenIssuer, TokenRedeemer};
    use crate::store::MemoryStore;
    use crate::utils::clock::SystemClock;

    fn owner() -> AdminIdentity {
        AdminIdentity {
            admin_id: Uuid::new_v4(),
            role: AdminRole::Owner,
        }
    }

    fn setup_test() -> (MemberService, StoreContext) {
        let store = Arc::new(MemoryStore::new());
        let ctx = StoreContext::new(store, Arc::new(SystemClock), StdDuration::from_secs(1));
        (MemberService::new(ctx.clone()), ctx)
    }

    async fn register(service: &MemberService, external_id: &str) -> MemberIdentity {
        let profile = service
            .register(
                &owner(),
                RegisterMember {
                    external_id: external_id.into(),
                    display_name: "Mei".into(),
                },
            )
            .await
            .unwrap();
        MemberIdentity {
            member_id: profile.id,
        }
    }

    fn credit(amount: i64) -> PointAdjustment {
        PointAdjustment {
            direction: Direction::Credit,
            amount,
            reason: "welcome bonus".into(),
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_external_id() {
        let (service, _) = setup_test();
        let first = register(&service, "U100").await;
        let second = register(&service, "U100").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_adjustments_keep_ledger_consistent() {
        let (service, _) = setup_test();
        let member = register(&service, "U1").await;
        let admin = owner();

        service.adjust(&admin, member.member_id, credit(600)).await.unwrap();
        let debit = service
            .adjust(
                &admin,
                member.member_id,
                PointAdjustment {
                    direction: Direction::Debit,
                    amount: 150,
                    reason: "correction".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(debit.balance_after, 450);
        assert_eq!(debit.adjusted_by, Some(admin.admin_id));

        let profile = service.profile(&member).await.unwrap();
        assert_eq!(profile.points_balance, 450);
        assert_eq!(profile.rank, Rank::Regular);

        let page = service.ledger(&member, None, None).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries[0].balance_after, 450);
        assert_eq!(page.entries[1].balance_after, 600);
        let signed: i64 = page
            .entries
            .iter()
            .map(|e| e.direction.signed(e.amount))
            .sum();
        assert_eq!(signed, profile.points_balance);
    }

    #[tokio::test]
    async fn test_adjust_requires_owner_and_rejects_overdraw() {
        let (service, _) = setup_test();
        let member = register(&service, "U2").await;
        let staff = AdminIdentity {
            admin_id: Uuid::new_v4(),
            role: AdminRole::Staff,
        };

        assert!(matches!(
            service.adjust(&staff, member.member_id, credit(10)).await,
            Err(AppError::Forbidden(_))
        ));

        let overdraw = PointAdjustment {
            direction: Direction::Debit,
            amount: 1,
            reason: "oops".into(),
        };
        assert!(matches!(
            service.adjust(&owner(), member.member_id, overdraw).await,
            Err(AppError::InsufficientBalance { balance: 0, requested: 1 })
        ));
        assert!(matches!(
            service.adjust(&owner(), Uuid::new_v4(), credit(1)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ledger_pagination() {
        let (service, _) = setup_test();
        let member = register(&service, "U3").await;
        for _ in 0..5 {
            service.adjust(&owner(), member.member_id, credit(10)).await.unwrap();
        }

        let page = service.ledger(&member, Some(2), Some(2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].balance_after, 30);

        assert!(service.ledger(&member, Some(0), None).await.is_err());
        assert!(service.ledger(&member, None, Some(101)).await.is_err());
    }

    #[tokio::test]
    async fn test_review_slot_is_consumed_once() {
        let (service, ctx) = setup_test();
        let member = register(&service, "U4").await;
        let issuer = TokenIssuer::new(ctx.clone(), TtlPolicy::default());
        let redeemer = TokenRedeemer::new(ctx);

        let issued = issuer
            .issue(
                &owner(),
                IssueRequest {
                    kind: TokenKind::ReviewTicket,
                    target_member_id: None,
                    amount: None,
                    reason: None,
                    ttl_seconds: None,
                },
            )
            .await
            .unwrap();
        redeemer.redeem(&issued.value, &member).await.unwrap();

        let slots = service.open_review_slots(&member).await.unwrap();
        assert_eq!(slots.len(), 1);

        let submission = ReviewSubmission {
            slot_id: slots[0].id,
            rating: 5,
            comment: Some("Lovely cake".into()),
        };
        let review = service.submit_review(&member, submission.clone()).await.unwrap();
        assert_eq!(review.rating, 5);
        assert!(service.open_review_slots(&member).await.unwrap().is_empty());

        assert!(matches!(
            service.submit_review(&member, submission).await,
            Err(AppError::AlreadyUsed)
        ));

        let stranger = register(&service, "U5").await;
        assert!(matches!(
            service
                .submit_review(
                    &stranger,
                    ReviewSubmission {
                        slot_id: slots[0].id,
                        rating: 3,
                        comment: None
                    }
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_review_rating_bounds() {
        let (service, _) = setup_test();
        let member = register(&service, "U6").await;
        let result = service
            .submit_review(
                &member,
                ReviewSubmission {
                    slot_id: Uuid::new_v4(),
                    rating: 6,
                    comment: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
