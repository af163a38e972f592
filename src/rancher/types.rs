//! Rancher API resource types
//!
//! Structs that mirror the Rancher v1 JSON resources this tool reads and
//! writes. Only the fields the upgrade pipeline inspects are typed; every
//! other field is kept verbatim in a flattened map so that a launch config
//! survives the round trip unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Rancher collection envelope (`{"data": [...]}`)
#[derive(Deserialize, Debug)]
pub struct Collection<T> {
    /// Items in the collection
    pub data: Vec<T>,
}

/// A stack (called "environment" in the v1 API paths)
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Stack {
    /// Opaque stack identifier
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Human-readable stack name
    pub name: String,
}

/// A deployable service within a stack
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Opaque service identifier
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// Service name, unique within its stack
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Free-form status (e.g. "active", "upgrading", "upgraded")
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    /// Owning stack
    #[serde(
        default,
        deserialize_with = "optional_id_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub stack_id: Option<String>,
    /// Owning stack, as reported by older API versions
    #[serde(
        default,
        deserialize_with = "optional_id_from_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub environment_id: Option<String>,
    /// Current launch config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_config: Option<LaunchConfig>,
    /// Remaining service fields, kept for reporting
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Service {
    /// Id of the stack owning this service, if the API reported one
    pub fn owning_stack_id(&self) -> Option<&str> {
        self.stack_id
            .as_deref()
            .or(self.environment_id.as_deref())
    }
}

/// Runtime parameters of a service's instances
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// Image reference, `{type}:{repository}:{tag}`
    ///
    /// Empty when the orchestrator reports none (external and DNS services).
    #[serde(default)]
    pub image_uuid: String,
    /// Environment variables passed to the containers
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub environment: Map<String, Value>,
    /// Every other launch config field, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of the `upgrade` action
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeInstruction {
    /// In-service (rolling) upgrade strategy
    pub in_service_strategy: InServiceStrategy,
}

/// Rolling upgrade strategy carried by an [`UpgradeInstruction`]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InServiceStrategy {
    /// Target launch config
    pub launch_config: LaunchConfig,
    /// Start the new instance before stopping the old one
    pub start_first: bool,
}

/// What the orchestrator answered during an upgrade
///
/// The submission answer and the final status are kept apart. All fields
/// are absent in dry-run mode, in which case this serializes to `{}`.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct UpgradeResponse {
    /// Response to the `upgrade` action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<Value>,
    /// Service snapshot observed when the poller saw `upgraded`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<Service>,
    /// Response to the `finishupgrade` action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<Value>,
}

impl UpgradeResponse {
    /// True when no request reached the orchestrator (dry-run)
    pub fn is_empty(&self) -> bool {
        self.accepted.is_none() && self.completed.is_none() && self.finished.is_none()
    }
}

/// Result of [`crate::rancher::Rancher::upgrade`]
#[derive(Serialize, Debug, Clone)]
pub struct UpgradeResult {
    /// Service snapshot at resolution time
    pub service: Service,
    /// Instruction that was (or would have been) submitted
    pub upgrade: UpgradeInstruction,
    /// Orchestrator responses
    pub response: UpgradeResponse,
}

/// Failure classification reported by [`crate::rancher::Rancher::validate`]
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Anything not classified below, including network failures
    Unknown,
    /// The endpoint answered 404
    NotFoundEnvironment,
    /// The endpoint answered 401
    Unauthorized,
}

impl ErrorCode {
    /// Classify a failed probe by its HTTP status
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(404) => ErrorCode::NotFoundEnvironment,
            Some(401) => ErrorCode::Unauthorized,
            _ => ErrorCode::Unknown,
        }
    }

    /// Wire label, e.g. `UNAUTHORIZED`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::NotFoundEnvironment => "NOT_FOUND_ENVIRONMENT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
        }
    }
}

/// Outcome of an authenticated endpoint probe
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// The endpoint accepted the credentials
    pub is_valid: bool,
    /// Why it did not, when `is_valid` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl Validation {
    /// A successful probe
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error_code: None,
        }
    }

    /// A failed probe with the given classification
    pub fn invalid(code: ErrorCode) -> Self {
        Self {
            is_valid: false,
            error_code: Some(code),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_id_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
