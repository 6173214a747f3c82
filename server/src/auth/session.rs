use async_trait::async_trait;
use tracing::debug;

use super::{AdminIdentity, Identity, IdentityProvider, MemberIdentity};
use crate::models::SessionKind;
use crate::services::StoreContext;
use crate::store::SessionStore;
use crate::utils::error::AppError;
use crate::utils::secret::hash_value;

/// Resolves bearer credentials against `api_sessions`, keyed by SHA-256.
pub struct SessionIdentityProvider {
    ctx: StoreContext,
}

impl SessionIdentityProvider {
    pub fn new(ctx: StoreContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<Identity, AppError> {
        let hash = hash_value(credential);
        let session = self
            .ctx
            .call(self.ctx.store.find_session(&hash))
            .await?
            .ok_or_else(|| AppError::AuthError("unknown session".to_string()))?;

        if session.expires_at <= self.ctx.now() {
            debug!(subject = %session.subject_id, "Session expired");
            return Err(AppError::AuthError("session expired".to_string()));
        }

        match (session.kind, session.role) {
            (SessionKind::Admin, Some(role)) => Ok(Identity::Admin(AdminIdentity {
                admin_id: session.subject_id,
                role,
            })),
            (SessionKind::Admin, None) => Err(AppError::AuthError(
                "admin session without a role".to_string(),
            )),
            (SessionKind::Member, _) => Ok(Identity::Member(MemberIdentity {
                member_id: session.subject_id,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::{AdminRole, ApiSession};
    use crate::store::MemoryStore;
    use crate::utils::clock::{Clock, ManualClock};

    fn setup_test() -> (SessionIdentityProvider, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ctx = StoreContext::new(store.clone(), clock.clone(), StdDuration::from_secs(1));
        (SessionIdentityProvider::new(ctx), store, clock)
    }

    #[tokio::test]
    async fn test_resolves_admin_and_member_sessions() {
        let (provider, store, clock) = setup_test();
        let admin_id = Uuid::new_v4();
        let member_id = Uuid::new_v4();
        store.add_session(ApiSession {
            token_hash: hash_value("admin-credential"),
            kind: SessionKind::Admin,
            subject_id: admin_id,
            role: Some(AdminRole::Staff),
            expires_at: clock.now() + Duration::hours(1),
        });
        store.add_session(ApiSession {
            token_hash: hash_value("member-credential"),
            kind: SessionKind::Member,
            subject_id: member_id,
            role: None,
            expires_at: clock.now() + Duration::hours(1),
        });

        assert_eq!(
            provider.resolve("admin-credential").await.unwrap(),
            Identity::Admin(AdminIdentity {
                admin_id,
                role: AdminRole::Staff
            })
        );
        assert_eq!(
            provider.resolve("member-credential").await.unwrap(),
            Identity::Member(MemberIdentity { member_id })
        );
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_expired_sessions() {
        let (provider, store, clock) = setup_test();
        store.add_session(ApiSession {
            token_hash: hash_value("short-lived"),
            kind: SessionKind::Member,
            subject_id: Uuid::new_v4(),
            role: None,
            expires_at: clock.now() + Duration::minutes(1),
        });

        assert!(matches!(
            provider.resolve("nope").await,
            Err(AppError::AuthError(_))
        ));

        clock.advance(Duration::minutes(2));
        assert!(matches!(
            provider.resolve("short-lived").await,
            Err(AppError::AuthError(_))
        ));
    }
}
