//! Identity boundary.
//!
//! Handlers never inspect headers themselves: they take an [`AdminIdentity`]
//! or [`MemberIdentity`] argument, produced by the extractors in
//! [`extractor`] from the [`IdentityProvider`] held in application state.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::AdminRole;
use crate::utils::error::AppError;

pub mod extractor;
pub mod session;
#[cfg(any(test, feature = "test-identity"))]
pub mod fixed;

pub use session::SessionIdentityProvider;
#[cfg(any(test, feature = "test-identity"))]
pub use fixed::FixedIdentityProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminIdentity {
    pub admin_id: Uuid,
    pub role: AdminRole,
}

impl AdminIdentity {
    pub fn require_owner(&self) -> Result<(), AppError> {
        match self.role {
            AdminRole::Owner => Ok(()),
            AdminRole::Staff => Err(AppError::Forbidden(
                "this operation requires the owner role".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberIdentity {
    pub member_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Admin(AdminIdentity),
    Member(MemberIdentity),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a bearer credential. Unknown or expired credentials are `AuthError`.
    async fn resolve(&self, credential: &str) -> Result<Identity, AppError>;
}
