use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::StoreContext;
use crate::auth::AdminIdentity;
use crate::models::{ActionToken, NewActionToken, TokenKind, TtlPolicy};
use crate::store::{MemberStore, TokenStore};
use crate::utils::error::AppError;
use crate::utils::secret::{generate_token_value, hash_value, qr_payload};

pub const MAX_POINT_AMOUNT: i64 = 1_000_000;
pub const MAX_REASON_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub kind: TokenKind,
    pub target_member_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
    pub ttl_seconds: Option<i64>,
}

/// Returned once, at issue time. `value` and `qr_payload` are not recoverable later.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: ActionToken,
    pub value: String,
    pub qr_payload: String,
}

/// Checks kind-specific payload rules and resolves the token lifetime.
pub fn validate(request: &IssueRequest, policy: &TtlPolicy) -> Result<Duration, AppError> {
    if request.kind.moves_points() {
        match request.amount {
            Some(amount) if (1..=MAX_POINT_AMOUNT).contains(&amount) => {}
            Some(amount) => {
                return Err(AppError::ValidationError(format!(
                    "amount must be between 1 and {MAX_POINT_AMOUNT}, got {amount}"
                )))
            }
            None => {
                return Err(AppError::ValidationError(format!(
                    "{} tokens require an amount",
                    request.kind.as_str()
                )))
            }
        }
    } else if request.amount.is_some() {
        return Err(AppError::ValidationError(format!(
            "{} tokens do not carry an amount",
            request.kind.as_str()
        )));
    }

    if request.kind.requires_bound_member() && request.target_member_id.is_none() {
        return Err(AppError::ValidationError(format!(
            "{} tokens must name their member",
            request.kind.as_str()
        )));
    }

    if let Some(reason) = &request.reason {
        if reason.chars().count() > MAX_REASON_LEN {
            return Err(AppError::ValidationError(format!(
                "reason must be at most {MAX_REASON_LEN} characters"
            )));
        }
    }

    match request.ttl_seconds {
        None => Ok(policy.default_for(request.kind)),
        Some(secs) if secs <= 0 => Err(AppError::ValidationError(
            "ttl_seconds must be positive".to_string(),
        )),
        Some(secs) if secs > policy.max_ttl.num_seconds() => Err(AppError::ValidationError(
            format!("ttl_seconds must not exceed {}", policy.max_ttl.num_seconds()),
        )),
        Some(secs) => Ok(Duration::seconds(secs)),
    }
}

pub struct TokenIssuer {
    ctx: StoreContext,
    policy: TtlPolicy,
}

impl TokenIssuer {
    pub fn new(ctx: StoreContext, policy: TtlPolicy) -> Self {
        Self { ctx, policy }
    }

    pub async fn issue(
        &self,
        issuer: &AdminIdentity,
        request: IssueRequest,
    ) -> Result<IssuedToken, AppError> {
        let ttl = validate(&request, &self.policy)?;

        if let Some(member_id) = request.target_member_id {
            self.ctx
                .call(self.ctx.store.find_member(member_id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("member {member_id}")))?;
        }

        let value = generate_token_value();
        let now = self.ctx.now();
        let new_token = NewActionToken {
            id: Uuid::new_v4(),
            token_hash: hash_value(&value),
            kind: request.kind,
            issued_by: issuer.admin_id,
            target_member_id: request.target_member_id,
            amount: request.amount,
            reason: request.reason,
            created_at: now,
            expires_at: now + ttl,
        };

        let token = self
            .ctx
            .call(self.ctx.store.insert_token(new_token))
            .await?;

        info!(
            token_id = %token.id,
            kind = token.kind.as_str(),
            issued_by = %issuer.admin_id,
            expires_at = %token.expires_at,
            "Action token issued"
        );

        Ok(IssuedToken {
            qr_payload: qr_payload(&value),
            token,
            value,
        })
    }

    /// Status poll for the issuing screen.
    pub async fn status(&self, token_id: Uuid) -> Result<ActionToken, AppError> {
        self.ctx
            .call(self.ctx.store.find_token(token_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("token {token_id}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::Utc;

    use super::*;
    use crate::models::{AdminRole, Member, TokenStatus};
    use crate::store::MemoryStore;
    use crate::utils::clock::ManualClock;
    use crate::utils::secret::strip_qr_prefix;

    fn request(kind: TokenKind, amount: Option<i64>) -> IssueRequest {
        IssueRequest {
            kind,
            target_member_id: None,
            amount,
            reason: None,
            ttl_seconds: None,
        }
    }

    fn setup_test() -> (TokenIssuer, Arc<MemoryStore>, AdminIdentity) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ctx = StoreContext::new(store.clone(), clock, StdDuration::from_secs(1));
        let admin = AdminIdentity {
            admin_id: Uuid::new_v4(),
            role: AdminRole::Staff,
        };
        (TokenIssuer::new(ctx, TtlPolicy::default()), store, admin)
    }

    #[test]
    fn test_validate_point_amounts() {
        let policy = TtlPolicy::default();
        assert!(validate(&request(TokenKind::EarnPoints, Some(100)), &policy).is_ok());
        assert!(validate(&request(TokenKind::EarnPoints, Some(-5)), &policy).is_err());
        assert!(validate(&request(TokenKind::SpendPoints, Some(0)), &policy).is_err());
        assert!(validate(&request(TokenKind::SpendPoints, None), &policy).is_err());
        assert!(validate(&request(TokenKind::ReviewTicket, Some(1)), &policy).is_err());
        assert!(validate(&request(TokenKind::ReviewTicket, None), &policy).is_ok());
    }

    #[test]
    fn test_validate_ttl() {
        let policy = TtlPolicy::default();
        let mut req = request(TokenKind::EarnPoints, Some(10));
        assert_eq!(validate(&req, &policy).unwrap(), Duration::minutes(10));

        req.ttl_seconds = Some(60);
        assert_eq!(validate(&req, &policy).unwrap(), Duration::minutes(1));

        req.ttl_seconds = Some(0);
        assert!(validate(&req, &policy).is_err());

        req.ttl_seconds = Some(policy.max_ttl.num_seconds() + 1);
        assert!(validate(&req, &policy).is_err());
    }

    #[test]
    fn test_2fa_requires_member() {
        let policy = TtlPolicy::default();
        let mut req = request(TokenKind::Admin2faSession, None);
        assert!(matches!(
            validate(&req, &policy),
            Err(AppError::ValidationError(_))
        ));
        req.target_member_id = Some(Uuid::new_v4());
        assert!(validate(&req, &policy).is_ok());
    }

    #[tokio::test]
    async fn test_issue_persists_pending_token_with_hidden_value() {
        let (issuer, store, admin) = setup_test();

        let issued = issuer
            .issue(&admin, request(TokenKind::EarnPoints, Some(100)))
            .await
            .unwrap();

        assert_eq!(issued.token.status, TokenStatus::Pending);
        assert_eq!(issued.token.issued_by, admin.admin_id);
        assert!(issued.token.expires_at > issued.token.created_at);
        assert_eq!(strip_qr_prefix(&issued.qr_payload), issued.value);
        assert_ne!(issued.value, issued.token.id.to_string());

        let stored = store
            .find_token_by_hash(&hash_value(&issued.value))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, issued.token.id);
        assert_ne!(stored.token_hash, issued.value);
    }

    #[tokio::test]
    async fn test_issue_rejects_unknown_target_member() {
        let (issuer, _store, admin) = setup_test();
        let mut req = request(TokenKind::EarnPoints, Some(10));
        req.target_member_id = Some(Uuid::new_v4());

        assert!(matches!(
            issuer.issue(&admin, req).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_binds_existing_member() {
        let (issuer, store, admin) = setup_test();
        let member = Member {
            id: Uuid::new_v4(),
            external_id: "U1".into(),
            display_name: "Aiko".into(),
            points_balance: 0,
            created_at: Utc::now(),
        };
        store.add_member(member.clone());

        let mut req = request(TokenKind::Admin2faSession, None);
        req.target_member_id = Some(member.id);
        let issued = issuer.issue(&admin, req).await.unwrap();
        assert_eq!(issued.token.target_member_id, Some(member.id));
        assert_eq!(
            issued.token.expires_at - issued.token.created_at,
            Duration::minutes(5)
        );
    }
}
