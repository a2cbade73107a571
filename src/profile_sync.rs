use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};

use crate::billing::BillingService;
use crate::config;
use crate::provisioner;
use crate::routeros::Controller;

/// key: profile-sync -> keep controller profiles in step with active plans
pub fn spawn(pool: PgPool, controller: Arc<Controller>) {
    let interval = TokioDuration::from_secs(*config::PROFILE_SYNC_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            // The first tick fires immediately, giving one sync at startup.
            ticker.tick().await;
            if let Err(err) = process_tick(&pool, &controller).await {
                warn!(%err, "hotspot profile sync tick failed");
            }
        }
    });
}

/// key: profile-sync -> tick handler
///
/// A connect-level failure aborts the whole tick (retried next interval);
/// per-plan failures are logged and the batch continues.
pub async fn process_tick(pool: &PgPool, controller: &Controller) -> Result<()> {
    controller.ensure_connected().await?;

    let service = BillingService::new(pool.clone());
    let plans = service.active_plans().await?;
    let mut created = 0usize;
    for plan in plans.iter().filter(|plan| plan.profile_name().is_some()) {
        match provisioner::ensure_profile(controller, plan).await {
            Ok(true) => {
                created += 1;
                info!(plan = plan.id, profile = %plan.profile, "created hotspot profile");
            }
            Ok(false) => {}
            Err(err) => {
                warn!(%err, plan = plan.id, profile = %plan.profile, "failed to ensure hotspot profile");
            }
        }
    }
    if created > 0 {
        info!(created, "hotspot profile sync created missing profiles");
    }
    Ok(())
}
