use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config;
use crate::provisioner;
use crate::routeros::Controller;

const RETRY_BATCH: i64 = 32;

/// key: provisioning-outbox -> durable retry for failed subscriber pushes
#[derive(Debug, FromRow)]
pub struct ProvisioningJob {
    pub id: Uuid,
    pub phone: String,
    pub profile: Option<String>,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Record a failed provisioning attempt for later retry. Best-effort: losing
/// the enqueue is logged, not propagated, since the billing commit already
/// happened.
pub async fn enqueue(pool: &PgPool, phone: &str, profile: Option<&str>) {
    let result = sqlx::query(
        "INSERT INTO provisioning_jobs (id, phone, profile) VALUES ($1, $2, $3)",
    )
    .bind(Uuid::new_v4())
    .bind(phone)
    .bind(profile)
    .execute(pool)
    .await;
    if let Err(err) = result {
        error!(%err, %phone, "failed to enqueue provisioning retry job");
    }
}

pub fn spawn(pool: PgPool, controller: Arc<Controller>) {
    let interval = TokioDuration::from_secs(*config::PROVISION_RETRY_INTERVAL_SECS);
    let base_delay = *config::PROVISION_RETRY_BASE_DELAY_SECS;

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&pool, &controller, base_delay).await {
                warn!(%err, "provisioning retry tick failed");
            }
        }
    });
}

/// key: provisioning-outbox -> tick handler
pub async fn process_tick(
    pool: &PgPool,
    controller: &Controller,
    base_delay_secs: u64,
) -> Result<usize> {
    let jobs = sqlx::query_as::<_, ProvisioningJob>(
        r#"
        SELECT * FROM provisioning_jobs
        WHERE completed_at IS NULL AND next_attempt_at <= NOW()
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(RETRY_BATCH)
    .fetch_all(pool)
    .await?;

    let mut settled = 0usize;
    for job in jobs {
        match provisioner::provision_subscriber(controller, &job.phone, job.profile.as_deref())
            .await
        {
            Ok(()) => {
                sqlx::query(
                    "UPDATE provisioning_jobs SET completed_at = NOW() WHERE id = $1",
                )
                .bind(job.id)
                .execute(pool)
                .await?;
                settled += 1;
                info!(phone = %job.phone, attempts = job.attempts, "provisioning retry succeeded");
            }
            Err(err) => {
                let delay = base_delay_secs.saturating_mul(job.attempts as u64 + 1) as f64;
                sqlx::query(
                    r#"
                    UPDATE provisioning_jobs
                    SET attempts = attempts + 1,
                        next_attempt_at = NOW() + make_interval(secs => $2),
                        last_error = $3
                    WHERE id = $1
                    "#,
                )
                .bind(job.id)
                .bind(delay)
                .bind(err.to_string())
                .execute(pool)
                .await?;
                warn!(
                    %err,
                    phone = %job.phone,
                    attempts = job.attempts + 1,
                    "provisioning retry failed; rescheduled"
                );
            }
        }
    }
    Ok(settled)
}
