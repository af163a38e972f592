//! Error types and error handling for the upgrade pipeline
//!
//! Every step of an upgrade (resolution, instruction building, submission,
//! polling, finalization) reports failures through [`AppError`]. Any error
//! aborts the whole sequence; there is no partial-success path.

use thiserror::Error;

/// Application-level error types
///
/// Each variant carries enough context for the CLI to report the error kind,
/// a message, and (when the failure came from the orchestrator) the raw
/// response body.
#[derive(Error, Debug)]
pub enum AppError {
    /// A stack or service name did not resolve
    #[error("Unable to locate {resource} '{name}'")]
    NotFound {
        /// What was being looked up ("stack" or "service")
        resource: &'static str,
        /// The name as given by the caller
        name: String,
    },

    /// Non-2xx status or network failure on an outbound call
    #[error("{context} failed{}: {message}", status_suffix(.status))]
    Transport {
        /// Which call failed, e.g. "GET services/"
        context: String,
        /// HTTP status, absent for network-level failures
        status: Option<u16>,
        /// Human-readable cause
        message: String,
        /// Raw response body, when one was received
        body: Option<String>,
    },

    /// The completion poller ran past its ceiling
    #[error("Service '{service_id}' did not finish upgrading within {waited_secs} seconds")]
    Timeout {
        /// Service being polled
        service_id: String,
        /// Seconds spent polling before giving up
        waited_secs: u64,
    },

    /// The completion poller lost the ability to query service state
    #[error("Unable to query state of service '{service_id}': {source}")]
    QueryFailure {
        /// Service being polled
        service_id: String,
        /// The failed query
        #[source]
        source: Box<AppError>,
    },

    /// The current image reference is not `{type}:{repository}:{tag}`
    #[error("Malformed image reference '{0}', expected '{{type}}:{{repository}}:{{tag}}'")]
    MalformedImage(String),

    /// The service has no launch config to upgrade
    #[error("Service '{0}' has no launch config")]
    MissingLaunchConfig(String),

    /// A 2xx response whose body could not be decoded
    #[error("Invalid response from {context}: {message}")]
    InvalidResponse {
        /// Which call returned the body
        context: String,
        /// Decoder error
        message: String,
        /// Raw response body
        body: String,
    },

    /// Internal error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable label for the error kind, used in CLI reports
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NotFound",
            AppError::Transport { .. } => "TransportError",
            AppError::Timeout { .. } => "Timeout",
            AppError::QueryFailure { .. } => "QueryFailure",
            AppError::MalformedImage(_) => "MalformedImage",
            AppError::MissingLaunchConfig(_) => "MissingLaunchConfig",
            AppError::InvalidResponse { .. } => "InvalidResponse",
            AppError::Internal(_) => "Internal",
        }
    }

    /// HTTP status of the failing call, if the orchestrator answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Transport { status, .. } => *status,
            AppError::QueryFailure { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Raw orchestrator response attached to this error, if any
    pub fn response_body(&self) -> Option<&str> {
        match self {
            AppError::Transport { body, .. } => body.as_deref(),
            AppError::InvalidResponse { body, .. } => Some(body),
            AppError::QueryFailure { source, .. } => source.response_body(),
            _ => None,
        }
    }

    /// Build a transport error from a failed `reqwest` call
    pub(crate) fn from_reqwest(context: impl Into<String>, err: reqwest::Error) -> Self {
        AppError::Transport {
            context: context.into(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
            body: None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
