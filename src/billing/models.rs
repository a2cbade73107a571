use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILED: &str = "failed";

/// key: portal-models -> access plans (administered out of band, read-only here)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: i32,
    pub name: String,
    pub price: i32,
    pub duration: String,
    pub profile: String,
    pub rate_limit: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// The controller profile to bind subscribers to, if one is configured.
    pub fn profile_name(&self) -> Option<&str> {
        let trimmed = self.profile.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// key: portal-models -> payment round-trips, correlated by checkout id
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub phone: String,
    pub amount: i32,
    pub plan_id: i32,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub status: String,
    pub receipt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: portal-models -> subscriber entitlements keyed by phone number
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PortalUser {
    pub phone: String,
    pub password: String,
    pub profile: Option<String>,
    pub active_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortalUser {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.active_until > now
    }
}
