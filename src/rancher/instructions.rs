//! Upgrade instruction builder
//!
//! Derives the `upgrade` action payload from a service's current launch
//! config. Changes are applied as a typed [`LaunchConfigOverride`] instead of
//! a generic recursive merge: the environment map merges key by key, the
//! image reference replaces, and every other field is carried through as-is.

use crate::error::AppError;
use crate::rancher::types::{InServiceStrategy, LaunchConfig, Service, UpgradeInstruction};
use serde_json::{Map, Value};

/// A `{type}:{repository}:{tag}` image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    kind: String,
    repository: String,
    tag: String,
}

impl ImageReference {
    /// Parse an image reference
    ///
    /// The first two colon-delimited segments are the type and repository;
    /// everything after the second colon is the tag.
    ///
    /// # Errors
    /// * Returns `AppError::MalformedImage` if there are fewer than three segments
    pub fn parse(image: &str) -> Result<Self, AppError> {
        let mut parts = image.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(repository), Some(tag)) => Ok(Self {
                kind: kind.to_string(),
                repository: repository.to_string(),
                tag: tag.to_string(),
            }),
            _ => Err(AppError::MalformedImage(image.to_string())),
        }
    }

    /// Current tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Same type and repository, new tag
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            kind: self.kind.clone(),
            repository: self.repository.clone(),
            tag: tag.to_string(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.repository, self.tag)
    }
}

/// Partial launch config applied on top of an existing one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchConfigOverride {
    /// Replaces `imageUuid` when set
    pub image_uuid: Option<String>,
    /// Merged into `environment`; later keys win
    pub environment: Map<String, Value>,
}

impl LaunchConfigOverride {
    /// Apply this override to `base`
    pub fn apply(self, mut base: LaunchConfig) -> LaunchConfig {
        if let Some(image) = self.image_uuid {
            base.image_uuid = image;
        }
        base.environment.extend(self.environment);
        base
    }
}

/// Build the upgrade instruction that moves `service` to `new_version`
///
/// # Arguments
/// * `service` - Service as resolved from the orchestrator
/// * `new_version` - Tag to substitute into the current image reference
/// * `start_first` - Start the new instance before stopping the old one
///
/// # Returns
/// * `Ok(UpgradeInstruction)` - Current launch config with the new image
/// * `Err(AppError)` - If the service has no launch config or its image is malformed
pub fn build_upgrade_instruction(
    service: &Service,
    new_version: &str,
    start_first: bool,
) -> Result<UpgradeInstruction, AppError> {
    let launch_config = service
        .launch_config
        .clone()
        .ok_or_else(|| AppError::MissingLaunchConfig(service.id.clone()))?;

    let current = ImageReference::parse(&launch_config.image_uuid)?;
    let image = current.with_tag(new_version);

    tracing::debug!(
        service_id = %service.id,
        from_tag = %current.tag(),
        to = %image,
        start_first = start_first,
        "Building upgrade instruction"
    );

    let launch_config = LaunchConfigOverride {
        image_uuid: Some(image.to_string()),
        ..Default::default()
    }
    .apply(launch_config);

    Ok(UpgradeInstruction {
        in_service_strategy: InServiceStrategy {
            launch_config,
            start_first,
        },
    })
}

impl UpgradeInstruction {
    /// Add (or overwrite) one environment variable in the target launch config
    ///
    /// Existing variables are preserved, so calls compose.
    pub fn add_environment_variable(mut self, key: &str, value: &str) -> Self {
        let mut environment = Map::new();
        environment.insert(key.to_string(), Value::String(value.to_string()));

        let strategy = &mut self.in_service_strategy;
        strategy.launch_config = LaunchConfigOverride {
            image_uuid: None,
            environment,
        }
        .apply(std::mem::take(&mut strategy.launch_config));
        self
    }

    /// Image reference the instruction upgrades to
    pub fn image(&self) -> &str {
        &self.in_service_strategy.launch_config.image_uuid
    }
}
