//! Upgrade submission and finalization
//!
//! The two state-changing calls of an upgrade. Neither retries: whatever the
//! orchestrator answers is propagated as-is.

use crate::error::AppError;
use crate::rancher::api_client::RancherApi;
use crate::rancher::types::UpgradeInstruction;
use serde_json::Value;
use tracing::info;

/// Submit `instruction` as an in-service upgrade of `service_id`
///
/// # Returns
/// * `Ok(Value)` - The accepted (still pending) service resource
/// * `Err(AppError)` - Transport error with the orchestrator's status and body
pub async fn submit_upgrade(
    api: &RancherApi,
    service_id: &str,
    instruction: &UpgradeInstruction,
) -> Result<Value, AppError> {
    info!(
        service_id = %service_id,
        image = %instruction.image(),
        start_first = instruction.in_service_strategy.start_first,
        "Submitting upgrade"
    );

    let accepted = api.upgrade_service(service_id, instruction).await?;

    let state = accepted
        .get("state")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(service_id = %service_id, state = %state, "Upgrade accepted");
    Ok(accepted)
}

/// Confirm a completed upgrade so the previous revision is removed
///
/// # Returns
/// * `Ok(Value)` - The orchestrator's answer to `finishupgrade`
/// * `Err(AppError)` - Transport error with the orchestrator's status and body
pub async fn finish_upgrade(api: &RancherApi, service_id: &str) -> Result<Value, AppError> {
    info!(service_id = %service_id, "Finishing upgrade");
    let finished = api.finish_upgrade(service_id).await?;
    info!(service_id = %service_id, "Upgrade finished");
    Ok(finished)
}
