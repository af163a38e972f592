//! Rancher module
//!
//! Contains the building blocks of a service upgrade and the [`Rancher`]
//! facade that runs them in order:
//!
//! resolve → build instruction (+ env vars) → submit → poll → finish
//!
//! Submission, polling and finalization are skipped in dry-run mode.

pub mod api_client;
pub mod constants;
pub mod instructions;
pub mod poller;
pub mod resolver;
pub mod types;
pub mod upgrade;

use crate::error::AppError;
use api_client::RancherApi;
use constants::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use poller::CompletionPoller;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use types::{ErrorCode, UpgradeResponse, UpgradeResult, Validation};
use uuid::Uuid;

/// Options for [`Rancher`]
#[derive(Debug, Clone)]
pub struct RancherOptions {
    /// Project endpoint, e.g. `https://rancher.example.com/v1/projects/1a5`
    pub url: String,
    /// API access key
    pub access_key: String,
    /// API secret key
    pub secret_key: String,
    /// Resolve and build only, never change anything
    pub dry_run: bool,
    /// Environment variable that receives the commit reference
    pub commit_variable: Option<String>,
    /// Environment variable that receives the release version
    pub release_variable: Option<String>,
    /// Delay between two state queries while waiting for completion
    pub poll_interval: Duration,
    /// Give up waiting for completion after this long
    pub poll_timeout: Duration,
}

impl RancherOptions {
    /// Options with everything optional left at its default
    pub fn new(url: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            url: url.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            dry_run: false,
            commit_variable: None,
            release_variable: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Orchestration client for one Rancher project
#[derive(Debug, Clone)]
pub struct Rancher {
    api: RancherApi,
    poller: CompletionPoller,
    dry_run: bool,
    commit_variable: Option<String>,
    release_variable: Option<String>,
}

impl Rancher {
    /// Create a client from options
    ///
    /// # Errors
    /// * Returns `AppError::Internal` if the HTTP client cannot be built
    pub fn new(options: RancherOptions) -> Result<Self, AppError> {
        Ok(Self {
            api: RancherApi::new(&options.url, &options.access_key, &options.secret_key)?,
            poller: CompletionPoller::new(options.poll_interval, options.poll_timeout),
            dry_run: options.dry_run,
            commit_variable: options.commit_variable,
            release_variable: options.release_variable,
        })
    }

    /// Whether state-changing calls are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Probe the endpoint with the configured credentials
    ///
    /// 404 maps to `NOT_FOUND_ENVIRONMENT`, 401 to `UNAUTHORIZED`, anything
    /// else (including network failures) to `UNKNOWN`.
    pub async fn validate(&self) -> Validation {
        match self.api.probe().await {
            Ok(()) => Validation::valid(),
            Err(e) => {
                let code = ErrorCode::from_status(e.status());
                warn!(
                    url = %self.api.base_url(),
                    error_code = code.as_str(),
                    error = %e,
                    "Endpoint validation failed"
                );
                Validation::invalid(code)
            }
        }
    }

    /// Upgrade service `name` to image tag `version`
    ///
    /// # Arguments
    /// * `name` - `service` or `stack/service`, case-insensitive
    /// * `version` - New image tag
    /// * `commit` - Commit reference, injected when a commit variable is configured
    /// * `start_first` - Start the new instance before stopping the old one
    ///
    /// # Returns
    /// * `Ok(UpgradeResult)` - Resolved service, submitted instruction and
    ///   orchestrator responses (empty in dry-run mode)
    /// * `Err(AppError)` - The first failure; later steps are not attempted
    pub async fn upgrade(
        &self,
        name: &str,
        version: &str,
        commit: Option<&str>,
        start_first: bool,
    ) -> Result<UpgradeResult, AppError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "upgrade",
            run_id = %run_id,
            service = %name,
            version = %version,
            dry_run = self.dry_run,
        );

        self.run_upgrade(name, version, commit, start_first)
            .instrument(span)
            .await
    }

    async fn run_upgrade(
        &self,
        name: &str,
        version: &str,
        commit: Option<&str>,
        start_first: bool,
    ) -> Result<UpgradeResult, AppError> {
        let service = resolver::resolve_service(&self.api, name).await?;
        let mut instruction =
            instructions::build_upgrade_instruction(&service, version, start_first)?;

        if let (Some(variable), Some(commit)) = (
            self.commit_variable.as_deref(),
            commit.filter(|c| !c.is_empty()),
        ) {
            instruction = instruction.add_environment_variable(variable, commit);
        }
        if let Some(variable) = self.release_variable.as_deref() {
            instruction = instruction.add_environment_variable(variable, version);
        }

        tracing::debug!(
            instruction = %serde_json::to_string(&instruction).unwrap_or_default(),
            "Built upgrade instruction"
        );

        if self.dry_run {
            info!(
                service_id = %service.id,
                image = %instruction.image(),
                "Dry run, not submitting upgrade"
            );
            return Ok(UpgradeResult {
                service,
                upgrade: instruction,
                response: UpgradeResponse::default(),
            });
        }

        let accepted = upgrade::submit_upgrade(&self.api, &service.id, &instruction).await?;
        let completed = self.poller.await_completion(&self.api, &service.id).await?;
        let finished = upgrade::finish_upgrade(&self.api, &service.id).await?;

        Ok(UpgradeResult {
            service,
            upgrade: instruction,
            response: UpgradeResponse {
                accepted: Some(accepted),
                completed: Some(completed),
                finished: Some(finished),
            },
        })
    }
}
