use anyhow::Result;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::mpesa::PushHandle;

use super::models::{Plan, PortalUser, Transaction, STATUS_PENDING};

/// key: portal-service -> plan lookups, payment round-trips, entitlements
#[derive(Clone)]
pub struct BillingService {
    pool: PgPool,
}

impl BillingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn active_plans(&self) -> Result<Vec<Plan>> {
        let plans = sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE active = TRUE ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(plans)
    }

    pub async fn find_active_plan(&self, plan_id: i32) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE id = $1 AND active = TRUE",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    /// Lookup without the active filter: a paid transaction still resolves
    /// its plan even if the plan was retired mid-flight.
    pub async fn find_plan(&self, plan_id: i32) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    pub async fn create_pending_transaction(
        &self,
        phone: &str,
        plan: &Plan,
        push: &PushHandle,
    ) -> Result<Transaction> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id,
                phone,
                amount,
                plan_id,
                merchant_request_id,
                checkout_request_id,
                status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(plan.price)
        .bind(plan.id)
        .bind(&push.merchant_request_id)
        .bind(&push.checkout_request_id)
        .bind(STATUS_PENDING)
        .fetch_one(&self.pool)
        .await?;
        Ok(transaction)
    }

    pub async fn find_transaction(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE checkout_request_id = $1",
        )
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    /// Move a pending transaction to a terminal status. Returns `None` when
    /// the transaction is already terminal, which makes duplicate webhook
    /// deliveries status no-ops.
    pub async fn complete_transaction(
        &self,
        checkout_request_id: &str,
        status: &str,
        receipt: Option<&str>,
    ) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2, receipt = COALESCE($3, receipt), updated_at = NOW()
            WHERE checkout_request_id = $1 AND status = $4
            RETURNING *
            "#,
        )
        .bind(checkout_request_id)
        .bind(status)
        .bind(receipt)
        .bind(STATUS_PENDING)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    /// Extend the phone number's access window by `duration`.
    ///
    /// An unexpired window stacks: the new duration is added to whatever
    /// remains. An expired or absent window starts from now. Done in one
    /// statement so `active_until` can only move forward even under
    /// concurrent confirmations.
    pub async fn grant_access(
        &self,
        phone: &str,
        profile: Option<&str>,
        duration: Duration,
    ) -> Result<PortalUser> {
        let seconds = duration.num_seconds() as f64;
        let user = sqlx::query_as::<_, PortalUser>(
            r#"
            INSERT INTO portal_users (phone, password, profile, active_until)
            VALUES ($1, $1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (phone) DO UPDATE SET
                profile = EXCLUDED.profile,
                active_until =
                    GREATEST(portal_users.active_until, NOW()) + make_interval(secs => $3),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(phone)
        .bind(profile)
        .bind(seconds)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn lookup_user(&self, phone: &str) -> Result<Option<PortalUser>> {
        let user = sqlx::query_as::<_, PortalUser>(
            "SELECT * FROM portal_users WHERE phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
