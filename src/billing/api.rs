use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::mpesa::{CallbackEnvelope, PaymentGateway};
use crate::routeros::Controller;

use super::models::Plan;
use super::reconciliation;
use super::service::BillingService;

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^254\d{9}$").expect("phone pattern"));

/// key: portal-api -> public captive-portal endpoints
pub async fn list_plans(
    Extension(pool): Extension<PgPool>,
) -> Result<Json<Vec<Plan>>, AppError> {
    let plans = BillingService::new(pool).active_plans().await?;
    Ok(Json(plans))
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub phone: String,
    pub plan_id: i32,
}

#[derive(Debug, Serialize)]
pub struct PayResponse {
    pub success: bool,
    #[serde(rename = "checkoutId", skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PayResponse {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            checkout_id: None,
            error: Some(error.into()),
        }
    }
}

pub async fn initiate_payment(
    Extension(pool): Extension<PgPool>,
    Extension(gateway): Extension<Arc<dyn PaymentGateway>>,
    Json(payload): Json<PayRequest>,
) -> Result<(StatusCode, Json<PayResponse>), AppError> {
    let phone = payload.phone.trim();
    if !PHONE_PATTERN.is_match(phone) {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(PayResponse::rejected("phone must match 254XXXXXXXXX")),
        ));
    }

    let service = BillingService::new(pool);
    let Some(plan) = service.find_active_plan(payload.plan_id).await? else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(PayResponse::rejected("unknown or inactive plan")),
        ));
    };

    let push = match gateway
        .request_push(phone, i64::from(plan.price), &plan.id.to_string())
        .await
    {
        Ok(push) => push,
        Err(err) => {
            error!(%err, %phone, plan = plan.id, "payment gateway push failed");
            return Ok((
                StatusCode::BAD_GATEWAY,
                Json(PayResponse::rejected("payment gateway unavailable")),
            ));
        }
    };

    let transaction = service
        .create_pending_transaction(phone, &plan, &push)
        .await?;
    info!(
        %phone,
        plan = plan.id,
        amount = plan.price,
        checkout = %transaction.checkout_request_id,
        "push payment initiated"
    );
    Ok((
        StatusCode::OK,
        Json(PayResponse {
            success: true,
            checkout_id: Some(transaction.checkout_request_id),
            error: None,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

/// Always acknowledges structurally-valid payloads; reconciliation-level
/// failures surface only in logs so the gateway does not retry forever.
pub async fn payment_callback(
    Extension(pool): Extension<PgPool>,
    Extension(controller): Extension<Arc<Controller>>,
    Json(envelope): Json<CallbackEnvelope>,
) -> Result<Json<CallbackAck>, AppError> {
    let callback = envelope.body.stk_callback;
    let outcome = reconciliation::process_callback(&pool, &controller, &callback).await?;
    debug!(?outcome, checkout = %callback.checkout_request_id, "payment callback settled");
    Ok(Json(CallbackAck {
        result_code: 0,
        result_desc: "Accepted".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ValidateUserResponse {
    pub phone: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_until: Option<DateTime<Utc>>,
}

pub async fn validate_user(
    Extension(pool): Extension<PgPool>,
    Path(phone): Path<String>,
) -> Result<Json<ValidateUserResponse>, AppError> {
    let user = BillingService::new(pool).lookup_user(&phone).await?;
    let now = Utc::now();
    let response = match user {
        Some(user) => ValidateUserResponse {
            active: user.is_active(now),
            active_until: Some(user.active_until),
            phone: user.phone,
        },
        None => ValidateUserResponse {
            phone,
            active: false,
            active_until: None,
        },
    };
    Ok(Json(response))
}
