//! ruletest - Workflow Rule Test Runner
//!
//! Runs the rule tests listed in a manifest and prints a report. Exits with a
//! non-zero status if any test did not pass.

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use ruletest::{app, cli::Cli, config::Config, formatting::formatter_for};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        // Manually initialize logger for this specific error
        env_logger::init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("ruletest starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Manifest: {}", config.manifest_path().display());
    info!("Runner: {}", config.runner.program);
    if !config.runner.extra_args.is_empty() {
        info!("Runner Extra Args: {}", config.runner.extra_args.join(" "));
    }
    match config.runner.timeout_seconds {
        Some(timeout) => info!("Runner Timeout: {}s", timeout),
        None => info!("Runner Timeout: None"),
    }
    let modes: Vec<String> = config.deploy.iter().map(|m| m.to_string()).collect();
    info!(
        "Deployment Modes: {}",
        if modes.is_empty() {
            "None".to_string()
        } else {
            modes.join(", ")
        }
    );
    match &config.workspace_root {
        Some(root) => info!("Workspace Root: {}", root.display()),
        None => info!("Workspace Root: System Default"),
    }
    info!("Jobs: {}", config.effective_jobs());
    info!("Keep Going: {}", config.suite.keep_going);
    info!("Output Format: {}", config.output.format);
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received. Cancelling rule tests...");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = app::run(&config, &cli.rules, shutdown_rx).await?;
    println!("{}", formatter_for(config.output.format).format_report(&report));

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
