use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::{bounded, Store, StoreResult};
use crate::utils::clock::Clock;
use crate::utils::error::AppError;

pub mod availability;
pub mod issuer;
pub mod members;
pub mod redeemer;
pub mod reservations;
pub mod sweep;

pub use availability::{AvailabilityCalculator, Slots, TimeSlot};
pub use issuer::{IssueRequest, IssuedToken, TokenIssuer};
pub use members::MemberService;
pub use redeemer::{RedemptionResult, TokenRedeemer};
pub use reservations::{BookingRequest, ReservationService};

/// What every service needs to talk to the store: the store itself, the
/// clock, and the per-call time limit.
#[derive(Clone)]
pub struct StoreContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub timeout: Duration,
}

impl StoreContext {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            store,
            clock,
            timeout,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Awaits a store call under the configured timeout.
    pub async fn call<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        bounded(self.timeout, fut).await.map_err(AppError::from)
    }
}
