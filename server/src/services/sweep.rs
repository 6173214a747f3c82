use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::StoreContext;
use crate::store::TokenStore;
use crate::utils::error::AppError;

/// Marks every pending token past its expiry as expired. Redemption also
/// expires tokens lazily, so the sweep only affects tokens nobody scanned.
pub async fn sweep_once(ctx: &StoreContext) -> Result<u64, AppError> {
    ctx.call(ctx.store.sweep_expired(ctx.now())).await
}

pub fn spawn_sweeper(ctx: StoreContext, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Starting token expiry sweeper");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match sweep_once(&ctx).await {
                Ok(0) => debug!("No expired tokens to sweep"),
                Ok(swept) => info!(swept, "Expired pending tokens"),
                Err(e) => warn!("Token sweep failed: {}", e),
            }
        }
    })
}
