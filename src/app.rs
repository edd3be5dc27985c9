//! Application wiring: configuration in, suite report out.

use crate::checker::OutputCheckerFactory;
use crate::config::Config;
use crate::core::{VerifierFactory, WorkflowRunner};
use crate::executor::TestEnvironment;
use crate::manifest::{self, Manifest};
use crate::runner::SubprocessRunner;
use crate::suite::{Suite, SuiteOptions, SuiteReport};
use anyhow::Result;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Builds the suite described by `config`, restricted to `rules` when given.
pub fn build_suite(
    config: &Config,
    rules: &[String],
    runner: Arc<dyn WorkflowRunner>,
    verifiers: Arc<dyn VerifierFactory>,
) -> Result<Suite> {
    let manifest_path = config.manifest_path();
    let manifest = Manifest::load(&manifest_path)?;
    info!(
        "Loaded {} rule test(s) from {}",
        manifest.entries().len(),
        manifest_path.display()
    );

    let cases = manifest::select(manifest.cases(&config.deploy_modes()), rules)?;
    let env = TestEnvironment::new(runner, verifiers)
        .with_workspace_root(config.workspace_root.clone());
    let options = SuiteOptions {
        jobs: config.effective_jobs(),
        keep_going: config.suite.keep_going,
    };
    Ok(Suite::new(env.generate_all(cases), options))
}

/// Runs the configured suite with the subprocess runner and the default
/// output checker.
pub async fn run(
    config: &Config,
    rules: &[String],
    shutdown_rx: watch::Receiver<bool>,
) -> Result<SuiteReport> {
    let runner = Arc::new(SubprocessRunner::from_config(&config.runner));
    let suite = build_suite(config, rules, runner, Arc::new(OutputCheckerFactory))?;
    Ok(suite.run(shutdown_rx).await)
}
