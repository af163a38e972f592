//! Rancher constants
//!
//! Centralized constants used throughout the rancher module.

use std::time::Duration;

/// Service action that submits an in-service upgrade
pub const ACTION_UPGRADE: &str = "upgrade";

/// Service action that confirms an upgrade and removes the old revision
pub const ACTION_FINISH_UPGRADE: &str = "finishupgrade";

/// Service state reported once the new revision is running
pub const STATE_UPGRADED: &str = "upgraded";

/// Delay between two service state queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polling ceiling before an upgrade is reported as timed out
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);
