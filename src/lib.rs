//! rancher-for-ci library
//!
//! Upgrades a Rancher service to a new image tag from a CI pipeline and
//! waits for the rollout to finish. The binary in `src/main.rs` wires
//! configuration, the [`rancher::Rancher`] client and the optional
//! Cloudflare cache purge together.

pub mod cli;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod rancher;
