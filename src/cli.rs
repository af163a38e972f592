//! Command-line flags
//!
//! Every flag is optional at this layer: values left out on the command line
//! fall back to environment variables during [`crate::config::Config::resolve`].

use clap::Parser;

/// Upgrade a Rancher service to a new image tag
#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "rancher-for-ci",
    about = "Upgrade a Rancher service to a new image tag and wait for the rollout"
)]
pub struct Cli {
    /// Service to upgrade, `[stack-name/]service-name`
    #[arg(long)]
    pub service: Option<String>,

    /// Image tag to upgrade to (a leading `refs/tags/` is removed)
    #[arg(long)]
    pub version: Option<String>,

    /// Prefix to strip from the version, e.g. `v`
    #[arg(long)]
    pub version_prefix: Option<String>,

    /// Environment variable that receives the release version
    #[arg(long)]
    pub release_variable: Option<String>,

    /// Environment variable that receives the commit reference
    #[arg(long)]
    pub commit_variable: Option<String>,

    /// Commit reference
    #[arg(long)]
    pub commit: Option<String>,

    /// Start the new instance before stopping the old one (`true`/`false`)
    #[arg(long)]
    pub start_first: Option<String>,

    /// Print the upgrade instructions, which may expose secrets
    #[arg(long)]
    pub log_instructions: bool,

    /// Rancher API endpoint, e.g. `https://rancher.domain.com/v1/projects/1a5`
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Rancher API access key
    #[arg(long)]
    pub access_key: Option<String>,

    /// Rancher API secret key
    #[arg(long)]
    pub secret_key: Option<String>,

    /// Resolve the service and build the instructions without upgrading
    #[arg(long)]
    pub dry_run: bool,

    /// Cloudflare zone whose cache is purged after the upgrade
    #[arg(long)]
    pub cloudflare_zone_id: Option<String>,

    /// Cloudflare API token
    #[arg(long)]
    pub cloudflare_api_key: Option<String>,
}
