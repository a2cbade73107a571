use tracing::{debug, info, warn};

use crate::billing::models::Plan;
use crate::duration;
use crate::routeros::{Controller, ControllerError};

const HOTSPOT_USER: &str = "/ip/hotspot/user";
const HOTSPOT_PROFILE: &str = "/ip/hotspot/user/profile";

/// Replace the controller credential for `phone`.
///
/// Existing entries with that name are removed first; removal failures are
/// ignored because absence is the normal case on a first purchase. The final
/// add must succeed or the purchased access was never granted, so its error
/// propagates.
pub async fn provision_subscriber(
    controller: &Controller,
    phone: &str,
    profile: Option<&str>,
) -> Result<(), ControllerError> {
    let existing = controller
        .query(
            &format!("{HOTSPOT_USER}/print"),
            &[format!("?name={phone}")],
        )
        .await;
    for record in existing {
        let Some(id) = record.get(".id") else {
            continue;
        };
        if let Err(err) = controller
            .execute(&format!("{HOTSPOT_USER}/remove"), &[format!("=.id={id}")])
            .await
        {
            warn!(%phone, %id, %err, "failed to remove stale hotspot user before re-adding");
        }
    }

    let mut args = vec![format!("=name={phone}"), format!("=password={phone}")];
    if let Some(profile) = profile {
        args.push(format!("=profile={profile}"));
    }
    controller
        .execute(&format!("{HOTSPOT_USER}/add"), &args)
        .await?;
    info!(%phone, ?profile, "hotspot user provisioned");
    Ok(())
}

/// Create the plan's controller profile if it does not exist yet. Attributes
/// of an existing profile are never reconciled, only absence. Returns whether
/// a profile was created.
pub async fn ensure_profile(
    controller: &Controller,
    plan: &Plan,
) -> Result<bool, ControllerError> {
    let Some(name) = plan.profile_name() else {
        return Ok(false);
    };

    let found = controller
        .query(
            &format!("{HOTSPOT_PROFILE}/print"),
            &[format!("?name={name}")],
        )
        .await;
    if !found.is_empty() {
        debug!(profile = %name, "hotspot profile already present");
        return Ok(false);
    }

    let mut args = vec![format!("=name={name}")];
    if let Some(rate_limit) = plan.rate_limit.as_deref().map(str::trim) {
        if !rate_limit.is_empty() {
            args.push(format!("=rate-limit={rate_limit}"));
        }
    }
    if let Some(timeout) = duration::normalize(&plan.duration) {
        args.push(format!("=session-timeout={timeout}"));
    }
    controller
        .execute(&format!("{HOTSPOT_PROFILE}/add"), &args)
        .await?;
    Ok(true)
}
