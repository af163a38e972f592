//! rancher-for-ci
//!
//! Upgrades a Rancher service to a new image tag, waits for the rollout to
//! complete and finalizes it. Meant to run as a CI pipeline step; exits
//! non-zero on any failure.

use clap::Parser;
use rancher_for_ci::cli::Cli;
use rancher_for_ci::cloudflare;
use rancher_for_ci::config::Config;
use rancher_for_ci::error::AppError;
use rancher_for_ci::rancher::types::UpgradeResult;
use rancher_for_ci::rancher::Rancher;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{info, warn};

const HEADER: &str = "\n########################################################\n";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rancher_for_ci=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = match Config::from_env(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", e.help());
            return ExitCode::FAILURE;
        }
    };
    info!("Configuration loaded: {:?}", config);

    match run(&config).await {
        Ok(()) => {
            println!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    println!("Running rancher-for-ci v{}", env!("CARGO_PKG_VERSION"));

    let upgrade = &config.upgrade;
    println!(
        "Upgrading service {} to version {} ...",
        upgrade.service,
        upgrade.display_version()
    );

    let client = Rancher::new(config.rancher.to_options())?;

    let validation = client.validate().await;
    if !validation.is_valid {
        let code = validation
            .error_code
            .map(|c| c.as_str())
            .unwrap_or("UNKNOWN");
        anyhow::bail!(
            "Rancher endpoint {} rejected the credentials ({})",
            config.rancher.url,
            code
        );
    }

    let result = client
        .upgrade(
            &upgrade.service,
            &upgrade.version,
            upgrade.commit.as_deref(),
            upgrade.start_first,
        )
        .await?;

    report_success(config, &result);

    if let Some(cf) = &config.cloudflare {
        if client.is_dry_run() {
            info!("Dry run, skipping Cloudflare cache purge");
        } else if let Err(e) =
            cloudflare::purge_cache(&reqwest::Client::new(), &cf.zone_id, &cf.api_key).await
        {
            warn!(error = %e, body = ?e.response_body(), "Cloudflare cache purge failed");
        }
    }

    Ok(())
}

fn report_success(config: &Config, result: &UpgradeResult) {
    println!("{}", HEADER);
    if result.response.is_empty() {
        println!(" Dry run, no upgrade was submitted.");
    } else {
        println!(" Upgrade has been completed!");
    }
    println!("      service: {}", config.upgrade.service);
    println!("     to image: {}", result.upgrade.image());
    println!(
        "       commit: {}",
        config.upgrade.commit.as_deref().unwrap_or("-")
    );
    println!("{}", HEADER);

    if config.upgrade.log_instructions {
        eprintln!("\nService:");
        pretty_print(&result.service);
        eprintln!("\n\nUpgrade instructions:");
        pretty_print(&result.upgrade);
        eprintln!("\n\nRancher response:");
        pretty_print(&result.response);
        println!("{}", HEADER);
    }
}

fn report_failure(err: &anyhow::Error) {
    println!("{}", HEADER);
    eprintln!("Ops, something went wrong!");
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            eprintln!("                kind: {}", app.kind());
            eprintln!("               error: {}", app);
            if let Some(status) = app.status() {
                eprintln!("              status: {}", status);
            }
            if let Some(body) = app.response_body() {
                eprintln!("    rancher response: {}", body);
            }
        }
        None => eprintln!("               error: {:#}", err),
    }
    println!("{}", HEADER);
}

fn pretty_print<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            for line in json.lines() {
                eprintln!("    {}", line);
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize value for printing"),
    }
}
