use serde::Serialize;
use tracing::{info, warn};

use super::StoreContext;
use crate::auth::MemberIdentity;
use crate::models::{ActionToken, PointLedgerEntry, ReviewSlot, TokenStatus};
use crate::store::{MemberStore, RedeemOutcome, RedeemRequest, TokenStore};
use crate::utils::error::AppError;
use crate::utils::secret::{hash_value, strip_qr_prefix};

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionResult {
    pub token: ActionToken,
    pub ledger_entry: Option<PointLedgerEntry>,
    pub review_slot: Option<ReviewSlot>,
    pub balance: i64,
}

pub struct TokenRedeemer {
    ctx: StoreContext,
}

impl TokenRedeemer {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }

    /// Consumes a token exactly once. `input` is the raw value or the scanned
    /// QR payload. Every error is terminal for this call; only
    /// `TransientStoreFailure` may be retried, with the same input.
    pub async fn redeem(
        &self,
        input: &str,
        member: &MemberIdentity,
    ) -> Result<RedemptionResult, AppError> {
        let value = strip_qr_prefix(input);
        if value.is_empty() {
            return Err(AppError::ValidationError("token is required".to_string()));
        }

        let token = self
            .ctx
            .call(self.ctx.store.find_token_by_hash(&hash_value(value)))
            .await?
            .ok_or_else(|| AppError::NotFound("token".to_string()))?;

        let now = self.ctx.now();

        // Cheap rejections before opening the atomic unit. The store repeats
        // every check under its lock.
        if token.status != TokenStatus::Pending {
            return Err(AppError::AlreadyUsed);
        }
        if token.is_past_expiry(now) {
            self.ctx
                .call(self.ctx.store.expire_token(token.id, now))
                .await?;
            return Err(AppError::Expired);
        }
        if matches!(token.target_member_id, Some(target) if target != member.member_id) {
            return Err(AppError::MemberMismatch);
        }

        self.ctx
            .call(self.ctx.store.find_member(member.member_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("member {}", member.member_id)))?;

        let request = RedeemRequest {
            token_id: token.id,
            member_id: member.member_id,
            now,
        };

        match self.ctx.call(self.ctx.store.redeem_token(request)).await? {
            RedeemOutcome::Completed(redemption) => {
                info!(
                    token_id = %redemption.token.id,
                    kind = redemption.token.kind.as_str(),
                    member_id = %member.member_id,
                    balance = redemption.balance,
                    "Action token redeemed"
                );
                Ok(RedemptionResult {
                    token: redemption.token,
                    ledger_entry: redemption.entry,
                    review_slot: redemption.review_slot,
                    balance: redemption.balance,
                })
            }
            RedeemOutcome::AlreadyUsed => Err(AppError::AlreadyUsed),
            RedeemOutcome::Expired => Err(AppError::Expired),
            RedeemOutcome::MemberMismatch => Err(AppError::MemberMismatch),
            RedeemOutcome::InsufficientBalance { balance } => {
                warn!(
                    token_id = %token.id,
                    member_id = %member.member_id,
                    balance,
                    "Spend token exceeds balance"
                );
                Err(AppError::InsufficientBalance {
                    balance,
                    requested: token.amount.unwrap_or_default(),
                })
            }
        }
    }
}
