//! Fixed credential table for tests and local demos. Only compiled under
//! `cfg(test)` or the `test-identity` feature.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{AdminIdentity, Identity, IdentityProvider, MemberIdentity};
use crate::utils::error::AppError;

#[derive(Debug, Default)]
pub struct FixedIdentityProvider {
    identities: HashMap<String, Identity>,
}

impl FixedIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, credential: &str, admin: AdminIdentity) -> Self {
        self.identities
            .insert(credential.to_string(), Identity::Admin(admin));
        self
    }

    pub fn with_member(mut self, credential: &str, member: MemberIdentity) -> Self {
        self.identities
            .insert(credential.to_string(), Identity::Member(member));
        self
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentityProvider {
    async fn resolve(&self, credential: &str) -> Result<Identity, AppError> {
        self.identities
            .get(credential)
            .copied()
            .ok_or_else(|| AppError::AuthError("unknown credential".to_string()))
    }
}
