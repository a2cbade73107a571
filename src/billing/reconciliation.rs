use anyhow::Result;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::duration::ParsedDuration;
use crate::mpesa::StkCallback;
use crate::outbox;
use crate::provisioner;
use crate::routeros::Controller;

use super::models::{STATUS_FAILED, STATUS_SUCCESS};
use super::service::BillingService;

/// How one payment confirmation was settled. Every variant is a benign
/// outcome for the webhook caller; only store failures escape as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    UnknownTransaction,
    AlreadySettled,
    Failed,
    MissingPlan,
    UnparseableDuration,
    Granted { provisioned: bool },
}

/// key: payment-reconciliation -> webhook to entitlement state transition
///
/// The billing record and the access window are authoritative once
/// committed; controller provisioning is best-effort and falls back to the
/// durable outbox, never rolling the earlier steps back.
pub async fn process_callback(
    pool: &PgPool,
    controller: &Controller,
    callback: &StkCallback,
) -> Result<CallbackOutcome> {
    let service = BillingService::new(pool.clone());
    let checkout_request_id = callback.checkout_request_id.as_str();

    if service.find_transaction(checkout_request_id).await?.is_none() {
        warn!(
            checkout = %checkout_request_id,
            "payment callback did not match any transaction"
        );
        return Ok(CallbackOutcome::UnknownTransaction);
    }

    if !callback.is_success() {
        let settled = service
            .complete_transaction(checkout_request_id, STATUS_FAILED, None)
            .await?;
        return Ok(match settled {
            Some(transaction) => {
                info!(
                    checkout = %checkout_request_id,
                    phone = %transaction.phone,
                    result_code = callback.result_code,
                    desc = %callback.result_desc,
                    "payment failed"
                );
                CallbackOutcome::Failed
            }
            None => {
                info!(checkout = %checkout_request_id, "duplicate callback for settled transaction");
                CallbackOutcome::AlreadySettled
            }
        });
    }

    let receipt = callback.receipt();
    let Some(transaction) = service
        .complete_transaction(checkout_request_id, STATUS_SUCCESS, receipt.as_deref())
        .await?
    else {
        info!(checkout = %checkout_request_id, "duplicate callback for settled transaction");
        return Ok(CallbackOutcome::AlreadySettled);
    };

    let Some(plan) = service.find_plan(transaction.plan_id).await? else {
        warn!(
            checkout = %checkout_request_id,
            plan_id = transaction.plan_id,
            "paid transaction references a missing plan; access not granted"
        );
        return Ok(CallbackOutcome::MissingPlan);
    };
    if !plan.active {
        warn!(plan_id = plan.id, "granting access against a retired plan");
    }
    if let Some(amount) = callback.amount() {
        if amount != i64::from(plan.price) {
            warn!(
                reported = amount,
                expected = plan.price,
                plan_id = plan.id,
                "callback amount does not match plan price"
            );
        }
    }

    let window = ParsedDuration::parse(&plan.duration)
        .map(|parsed| parsed.to_chrono())
        .filter(|window| *window > chrono::Duration::zero());
    let Some(window) = window else {
        warn!(
            plan_id = plan.id,
            duration = %plan.duration,
            "plan duration is not parseable; access not granted"
        );
        return Ok(CallbackOutcome::UnparseableDuration);
    };

    let profile = plan.profile_name();
    let user = service
        .grant_access(&transaction.phone, profile, window)
        .await?;
    info!(
        phone = %user.phone,
        active_until = %user.active_until,
        plan = plan.id,
        "access window extended"
    );

    match provisioner::provision_subscriber(controller, &transaction.phone, profile).await {
        Ok(()) => Ok(CallbackOutcome::Granted { provisioned: true }),
        Err(err) => {
            warn!(
                %err,
                phone = %transaction.phone,
                "controller provisioning failed after billing; queued for retry"
            );
            outbox::enqueue(pool, &transaction.phone, profile).await;
            Ok(CallbackOutcome::Granted { provisioned: false })
        }
    }
}
