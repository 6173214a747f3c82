use std::sync::Arc;

use crate::auth::{IdentityProvider, SessionIdentityProvider};
use crate::models::TtlPolicy;
use crate::services::{
    AvailabilityCalculator, MemberService, ReservationService, StoreContext, TokenIssuer,
    TokenRedeemer,
};

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
    pub redeemer: Arc<TokenRedeemer>,
    pub members: Arc<MemberService>,
    pub reservations: Arc<ReservationService>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Production wiring: bearer credentials are resolved against stored sessions.
    pub fn new(ctx: StoreContext, slot_granularity_minutes: u32) -> Self {
        let identity = Arc::new(SessionIdentityProvider::new(ctx.clone()));
        Self::with_identity(ctx, slot_granularity_minutes, identity)
    }

    pub fn with_identity(
        ctx: StoreContext,
        slot_granularity_minutes: u32,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            issuer: Arc::new(TokenIssuer::new(ctx.clone(), TtlPolicy::default())),
            redeemer: Arc::new(TokenRedeemer::new(ctx.clone())),
            members: Arc::new(MemberService::new(ctx.clone())),
            reservations: Arc::new(ReservationService::new(ctx, slot_granularity_minutes)),
            identity,
        }
    }

    pub fn availability(&self) -> &AvailabilityCalculator {
        self.reservations.availability()
    }
}
