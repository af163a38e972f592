//! Directory resolver
//!
//! Turns a human-given `[stack/]service` name into the orchestrator's
//! service snapshot. Matching is exact and case-insensitive; when several
//! entries match, the last one in scan order wins.

use crate::error::AppError;
use crate::rancher::api_client::RancherApi;
use crate::rancher::types::{Service, Stack};

/// A parsed `[stack/]service` name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceName<'a> {
    /// Optional stack qualifier
    pub stack: Option<&'a str>,
    /// Service name
    pub service: &'a str,
}

impl<'a> ServiceName<'a> {
    /// Split on `/`: the last segment is the service, the one before it (if
    /// present and non-empty) is the stack.
    pub fn parse(name: &'a str) -> Self {
        let mut segments = name.rsplit('/');
        let service = segments.next().unwrap_or_default();
        let stack = segments.next().filter(|s| !s.is_empty());
        Self { stack, service }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Pick the stack called `name` (last match wins)
pub fn select_stack<'s>(stacks: &'s [Stack], name: &str) -> Option<&'s Stack> {
    stacks.iter().rev().find(|s| same_name(&s.name, name))
}

/// Pick the service called `name`, restricted to `stack_id` when given
/// (last match wins)
pub fn select_service<'s>(
    services: &'s [Service],
    name: &str,
    stack_id: Option<&str>,
) -> Option<&'s Service> {
    services.iter().rev().find(|s| {
        same_name(&s.name, name) && stack_id.map_or(true, |id| s.owning_stack_id() == Some(id))
    })
}

/// Resolve `[stack/]service` against the orchestrator
///
/// # Arguments
/// * `api` - Rancher API client
/// * `name` - `service` or `stack/service`, case-insensitive
///
/// # Returns
/// * `Ok(Service)` - The matching service snapshot
/// * `Err(AppError)` - `NotFound` if the stack or service does not exist,
///   `Transport` if a listing failed
pub async fn resolve_service(api: &RancherApi, name: &str) -> Result<Service, AppError> {
    let parsed = ServiceName::parse(name);

    let stack_id = match parsed.stack {
        Some(stack_name) => {
            let stacks = api.list_stacks().await?;
            let stack = select_stack(&stacks, stack_name).ok_or_else(|| AppError::NotFound {
                resource: "stack",
                name: stack_name.to_string(),
            })?;
            tracing::debug!(stack = %stack.name, stack_id = %stack.id, "Resolved stack");
            Some(stack.id.clone())
        }
        None => None,
    };

    let services = api.list_services().await?;
    let service = select_service(&services, parsed.service, stack_id.as_deref())
        .cloned()
        .ok_or_else(|| AppError::NotFound {
            resource: "service",
            name: parsed.service.to_string(),
        })?;

    tracing::info!(
        service = %service.name,
        service_id = %service.id,
        stack_id = ?service.owning_stack_id(),
        state = %service.state,
        "Resolved service"
    );

    Ok(service)
}
