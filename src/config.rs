//! Application configuration
//!
//! Configuration is resolved once at startup into [`Config`]. Each argument
//! is looked up, in order, from:
//!
//! 1. its command-line flag
//! 2. its environment variables, in the listed order (the exact name first,
//!    then its lowercase spelling)
//! 3. its default
//!
//! Empty values count as absent. Required arguments without a value fail
//! with [`ConfigError::MissingArgument`].

use crate::cli::Cli;
use crate::rancher::RancherOptions;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while resolving configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required argument was not supplied by any source
    #[error("argument \"{name}\" is missing")]
    MissingArgument {
        /// Argument name
        name: &'static str,
        /// What the argument is for
        description: &'static str,
        /// Example value
        usage: &'static str,
        /// Environment variables that were consulted
        vars: &'static [&'static str],
    },
}

impl ConfigError {
    /// Multi-line explanation of how to supply the missing argument
    pub fn help(&self) -> String {
        match self {
            ConfigError::MissingArgument {
                description,
                usage,
                vars,
                ..
            } => format!(
                "    description: {}\n          usage: {}\n       env vars: {}",
                description,
                usage,
                vars.join(", ")
            ),
        }
    }
}

/// Description of one configurable argument
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    /// Argument name, as shown in errors
    pub name: &'static str,
    /// What the argument is for
    pub description: &'static str,
    /// Example value
    pub usage: &'static str,
    /// Environment variables consulted, in order
    pub vars: &'static [&'static str],
}

/// Service to upgrade
pub const SERVICE: ArgSpec = ArgSpec {
    name: "service",
    description: "service name to be upgraded",
    usage: "[stack-name/]service-name",
    vars: &["PLUGIN_SERVICE"],
};

/// Target version
pub const VERSION: ArgSpec = ArgSpec {
    name: "version",
    description: "version to which you want to upgrade your service",
    usage: "1.0.0",
    vars: &[
        "VERSION",
        "PLUGIN_VERSION",
        "DRONE_TAG",
        "CI_TAG",
        "DRONE_COMMIT_REF",
    ],
};

/// Version prefix to strip
pub const VERSION_PREFIX: ArgSpec = ArgSpec {
    name: "version_prefix",
    description:
        "remove version prefix (e.g.: if set to \"v\", then a version \"v1.0.0\" will become \"1.0.0\")",
    usage: "v",
    vars: &["PLUGIN_VERSION_PREFIX"],
};

/// Release environment variable name
pub const RELEASE_VARIABLE: ArgSpec = ArgSpec {
    name: "release_variable",
    description: "adds an environment variable to Rancher containing the release version",
    usage: "SENTRY_RELEASE",
    vars: &["PLUGIN_RELEASE_VARIABLE"],
};

/// Commit environment variable name
pub const COMMIT_VARIABLE: ArgSpec = ArgSpec {
    name: "commit_variable",
    description: "adds an environment variable to Rancher containing the commit reference",
    usage: "SENTRY_GIT_COMMIT",
    vars: &["PLUGIN_COMMIT_VARIABLE"],
};

/// Commit reference
pub const COMMIT: ArgSpec = ArgSpec {
    name: "commit",
    description: "gets the commit ref",
    usage: "2f6a1e9",
    vars: &["DRONE_COMMIT", "CI_COMMIT"],
};

/// Rollout ordering
pub const START_FIRST: ArgSpec = ArgSpec {
    name: "start_first",
    description: "use \"start before stopping\" during upgrade",
    usage: "true|false",
    vars: &["START_FIRST"],
};

/// Print instructions after the upgrade
pub const LOG_INSTRUCTIONS: ArgSpec = ArgSpec {
    name: "log_instructions",
    description:
        "log upgrade instructions sent to rancher, which might expose sensitive information",
    usage: "true|false",
    vars: &["PLUGIN_LOG_INSTRUCTIONS"],
};

/// Rancher endpoint
pub const ENDPOINT: ArgSpec = ArgSpec {
    name: "endpoint",
    description: "rancher api url for the environment you wish to upgrade",
    usage: "https://rancher.domain.com/v1/projects/{ID}",
    vars: &["PLUGIN_ENDPOINT", "RANCHER_URL"],
};

/// Rancher access key
pub const ACCESS_KEY: ArgSpec = ArgSpec {
    name: "access_key",
    description: "access key for the given rancher api environment",
    usage: "<access-key>",
    vars: &["PLUGIN_ACCESS_KEY", "RANCHER_ACCESS_KEY"],
};

/// Rancher secret key
pub const SECRET_KEY: ArgSpec = ArgSpec {
    name: "secret_key",
    description: "secret key for the given rancher api environment",
    usage: "<secret-key>",
    vars: &["PLUGIN_SECRET_KEY", "RANCHER_SECRET_KEY"],
};

/// Cloudflare zone
pub const CLOUDFLARE_ZONE_ID: ArgSpec = ArgSpec {
    name: "cloudflare_zone_id",
    description: "cloudflare zone whose cache is purged after a successful upgrade",
    usage: "<zone-id>",
    vars: &["PLUGIN_CLOUDFLARE_ZONE_ID", "CLOUDFLARE_ZONE_ID"],
};

/// Cloudflare token
pub const CLOUDFLARE_API_KEY: ArgSpec = ArgSpec {
    name: "cloudflare_api_key",
    description: "cloudflare api token allowed to purge the zone cache",
    usage: "<api-token>",
    vars: &["PLUGIN_CLOUDFLARE_API_KEY", "CLOUDFLARE_API_KEY"],
};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Orchestrator connection and behaviour
    pub rancher: RancherConfig,
    /// What to upgrade and how
    pub upgrade: UpgradeConfig,
    /// Cache purge, when both zone and key are configured
    pub cloudflare: Option<CloudflareConfig>,
}

/// Orchestrator connection configuration
#[derive(Clone)]
pub struct RancherConfig {
    /// Project endpoint
    pub url: String,
    /// API access key
    pub access_key: String,
    /// API secret key
    pub secret_key: String,
    /// Skip state-changing calls
    pub dry_run: bool,
    /// Environment variable receiving the commit reference (uppercased)
    pub commit_variable: Option<String>,
    /// Environment variable receiving the release version (uppercased)
    pub release_variable: Option<String>,
}

impl fmt::Debug for RancherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RancherConfig")
            .field("url", &self.url)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("dry_run", &self.dry_run)
            .field("commit_variable", &self.commit_variable)
            .field("release_variable", &self.release_variable)
            .finish()
    }
}

impl RancherConfig {
    /// Client options with default polling behaviour
    pub fn to_options(&self) -> RancherOptions {
        RancherOptions {
            dry_run: self.dry_run,
            commit_variable: self.commit_variable.clone(),
            release_variable: self.release_variable.clone(),
            ..RancherOptions::new(&self.url, &self.access_key, &self.secret_key)
        }
    }
}

/// Upgrade request configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeConfig {
    /// `[stack/]service`
    pub service: String,
    /// Version with `refs/tags/` and the prefix removed
    pub version: String,
    /// Prefix that was removed from the version
    pub version_prefix: Option<String>,
    /// Commit reference
    pub commit: Option<String>,
    /// Start the new instance before stopping the old one
    pub start_first: bool,
    /// Print instructions after the upgrade
    pub log_instructions: bool,
}

impl UpgradeConfig {
    /// Version as shown to users, e.g. `[v]1.0.0`
    pub fn display_version(&self) -> String {
        match &self.version_prefix {
            Some(prefix) => format!("[{}]{}", prefix, self.version),
            None => self.version.clone(),
        }
    }
}

/// Cache purge configuration
#[derive(Clone)]
pub struct CloudflareConfig {
    /// Zone identifier
    pub zone_id: String,
    /// API token
    pub api_key: String,
}

impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("zone_id", &self.zone_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Looks up arguments in the configured sources
struct Sources<'a, L> {
    cli: &'a Cli,
    lookup: L,
}

impl<'a, L> Sources<'a, L>
where
    L: Fn(&str) -> Option<String>,
{
    fn env(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.is_empty())
    }

    fn optional(&self, spec: &ArgSpec, flag: Option<&String>) -> Option<String> {
        flag.filter(|v| !v.is_empty()).cloned().or_else(|| {
            spec.vars
                .iter()
                .find_map(|var| self.env(var).or_else(|| self.env(&var.to_lowercase())))
        })
    }

    fn required(&self, spec: &ArgSpec, flag: Option<&String>) -> Result<String, ConfigError> {
        self.optional(spec, flag)
            .ok_or(ConfigError::MissingArgument {
                name: spec.name,
                description: spec.description,
                usage: spec.usage,
                vars: spec.vars,
            })
    }
}

impl Config {
    /// Load configuration from command-line flags and the process environment
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |var| std::env::var(var).ok())
    }

    /// Resolve configuration from flags and an environment lookup function
    ///
    /// # Errors
    /// * Returns `ConfigError::MissingArgument` for the first required
    ///   argument no source provides
    pub fn resolve<L>(cli: &Cli, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let sources = Sources { cli, lookup };
        let cli = sources.cli;

        let endpoint = sources.required(&ENDPOINT, cli.endpoint.as_ref())?;
        let access_key = sources.required(&ACCESS_KEY, cli.access_key.as_ref())?;
        let secret_key = sources.required(&SECRET_KEY, cli.secret_key.as_ref())?;
        let service = sources.required(&SERVICE, cli.service.as_ref())?;

        let raw_version = sources.required(&VERSION, cli.version.as_ref())?;
        let version_prefix = sources.optional(&VERSION_PREFIX, cli.version_prefix.as_ref());
        let version = normalize_version(&raw_version, version_prefix.as_deref());

        let log_instructions = cli.log_instructions
            || sources
                .optional(&LOG_INSTRUCTIONS, None)
                .map_or(false, |v| parse_enabled(&v));
        let start_first = sources
            .optional(&START_FIRST, cli.start_first.as_ref())
            .map_or(true, |v| !parse_disabled(&v));

        let cloudflare = match (
            sources.optional(&CLOUDFLARE_ZONE_ID, cli.cloudflare_zone_id.as_ref()),
            sources.optional(&CLOUDFLARE_API_KEY, cli.cloudflare_api_key.as_ref()),
        ) {
            (Some(zone_id), Some(api_key)) => Some(CloudflareConfig { zone_id, api_key }),
            _ => None,
        };

        Ok(Self {
            rancher: RancherConfig {
                url: endpoint,
                access_key,
                secret_key,
                dry_run: cli.dry_run,
                commit_variable: sources
                    .optional(&COMMIT_VARIABLE, cli.commit_variable.as_ref())
                    .map(|v| v.to_uppercase()),
                release_variable: sources
                    .optional(&RELEASE_VARIABLE, cli.release_variable.as_ref())
                    .map(|v| v.to_uppercase()),
            },
            upgrade: UpgradeConfig {
                service,
                version,
                version_prefix,
                commit: sources.optional(&COMMIT, cli.commit.as_ref()),
                start_first,
                log_instructions,
            },
            cloudflare,
        })
    }
}

/// Strip a leading `refs/tags/`, then `prefix` if given
fn normalize_version(raw: &str, prefix: Option<&str>) -> String {
    let version = raw.strip_prefix("refs/tags/").unwrap_or(raw);
    match prefix {
        Some(prefix) => version.strip_prefix(prefix).unwrap_or(version).to_string(),
        None => version.to_string(),
    }
}

fn parse_enabled(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true")
}

fn parse_disabled(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    fn minimal_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PLUGIN_SERVICE", "prod/api"),
            ("DRONE_TAG", "1.2.3"),
            ("RANCHER_URL", "https://rancher.local/v1/projects/1a5"),
            ("RANCHER_ACCESS_KEY", "access"),
            ("RANCHER_SECRET_KEY", "secret"),
        ]
    }

    #[test]
    fn test_resolve_minimal() {
        let config = Config::resolve(&Cli::default(), env(&minimal_env())).unwrap();

        assert_eq!(config.rancher.url, "https://rancher.local/v1/projects/1a5");
        assert_eq!(config.rancher.access_key, "access");
        assert!(!config.rancher.dry_run);
        assert!(config.rancher.commit_variable.is_none());
        assert_eq!(config.upgrade.service, "prod/api");
        assert_eq!(config.upgrade.version, "1.2.3");
        assert!(config.upgrade.start_first);
        assert!(!config.upgrade.log_instructions);
        assert!(config.cloudflare.is_none());
    }

    #[test]
    fn test_missing_required_argument() {
        let mut vars = minimal_env();
        vars.retain(|(k, _)| *k != "RANCHER_SECRET_KEY");

        let err = Config::resolve(&Cli::default(), env(&vars)).unwrap_err();
        assert_eq!(err.to_string(), "argument \"secret_key\" is missing");
        assert!(err.help().contains("PLUGIN_SECRET_KEY, RANCHER_SECRET_KEY"));
    }

    #[test]
    fn test_flag_beats_environment() {
        let cli = Cli {
            service: Some("staging/worker".to_string()),
            ..Default::default()
        };
        let config = Config::resolve(&cli, env(&minimal_env())).unwrap();
        assert_eq!(config.upgrade.service, "staging/worker");
    }

    #[test]
    fn test_env_vars_in_declared_order() {
        let mut vars = minimal_env();
        vars.push(("VERSION", "9.9.9"));
        vars.push(("PLUGIN_ENDPOINT", "https://plugin.local"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert_eq!(config.upgrade.version, "9.9.9");
        assert_eq!(config.rancher.url, "https://plugin.local");
    }

    #[test]
    fn test_lowercase_env_fallback_and_empty_values() {
        let mut vars = minimal_env();
        vars.retain(|(k, _)| *k != "PLUGIN_SERVICE");
        vars.push(("PLUGIN_SERVICE", ""));
        vars.push(("plugin_service", "web"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert_eq!(config.upgrade.service, "web");
    }

    #[test]
    fn test_version_transforms() {
        let mut vars = minimal_env();
        vars.retain(|(k, _)| *k != "DRONE_TAG");
        vars.push(("DRONE_COMMIT_REF", "refs/tags/v2.0.0"));
        vars.push(("PLUGIN_VERSION_PREFIX", "v"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert_eq!(config.upgrade.version, "2.0.0");
        assert_eq!(config.upgrade.display_version(), "[v]2.0.0");
    }

    #[test]
    fn test_variable_names_are_uppercased() {
        let mut vars = minimal_env();
        vars.push(("PLUGIN_RELEASE_VARIABLE", "sentry_release"));
        vars.push(("PLUGIN_COMMIT_VARIABLE", "sentry_git_commit"));
        vars.push(("DRONE_COMMIT", "abc123"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert_eq!(
            config.rancher.release_variable.as_deref(),
            Some("SENTRY_RELEASE")
        );
        assert_eq!(
            config.rancher.commit_variable.as_deref(),
            Some("SENTRY_GIT_COMMIT")
        );
        assert_eq!(config.upgrade.commit.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_boolean_arguments() {
        let mut vars = minimal_env();
        vars.push(("START_FIRST", "false"));
        vars.push(("PLUGIN_LOG_INSTRUCTIONS", "1"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert!(!config.upgrade.start_first);
        assert!(config.upgrade.log_instructions);

        let mut vars = minimal_env();
        vars.push(("START_FIRST", "true"));
        vars.push(("PLUGIN_LOG_INSTRUCTIONS", "yes"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert!(config.upgrade.start_first);
        assert!(!config.upgrade.log_instructions);
    }

    #[test]
    fn test_cloudflare_requires_zone_and_key() {
        let mut vars = minimal_env();
        vars.push(("CLOUDFLARE_ZONE_ID", "zone-123"));

        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        assert!(config.cloudflare.is_none());

        vars.push(("PLUGIN_CLOUDFLARE_API_KEY", "cf-token"));
        let config = Config::resolve(&Cli::default(), env(&vars)).unwrap();
        let cloudflare = config.cloudflare.unwrap();
        assert_eq!(cloudflare.zone_id, "zone-123");
        assert!(!format!("{:?}", cloudflare).contains("cf-token"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = Config::resolve(&Cli::default(), env(&minimal_env())).unwrap();
        let printed = format!("{:?}", config);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("\"secret\""));
        assert!(!printed.contains("\"access\""));
        assert!(printed.contains("https://rancher.local/v1/projects/1a5"));
    }

    #[test]
    fn test_to_options() {
        let cli = Cli {
            dry_run: true,
            ..Default::default()
        };
        let mut vars = minimal_env();
        vars.push(("PLUGIN_RELEASE_VARIABLE", "release"));

        let options = Config::resolve(&cli, env(&vars))
            .unwrap()
            .rancher
            .to_options();
        assert!(options.dry_run);
        assert_eq!(options.release_variable.as_deref(), Some("RELEASE"));
        assert_eq!(options.secret_key, "secret");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        let vars = [
            ("PLUGIN_SERVICE", "api"),
            ("VERSION", "3.1.4"),
            ("PLUGIN_ENDPOINT", "http://127.0.0.1:8080/v1/projects/1a5"),
            ("PLUGIN_ACCESS_KEY", "access"),
            ("PLUGIN_SECRET_KEY", "secret"),
        ];
        for (k, v) in vars {
            std::env::set_var(k, v);
        }

        let config = Config::from_env(&Cli::default());

        for (k, _) in vars {
            std::env::remove_var(k);
        }

        let config = config.unwrap();
        assert_eq!(config.upgrade.service, "api");
        assert_eq!(config.upgrade.version, "3.1.4");
    }
}
