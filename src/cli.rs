//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged over
//! the configuration from the `ruletest.toml` file and environment variables.

use crate::config::OutputFormat;
use crate::core::DeployMode;
use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Figment, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Runs fixture-based unit tests for individual workflow rules.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ruletest", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the rule test manifest.
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Directory holding the manifest and rule fixtures.
    #[arg(long, value_name = "DIR")]
    pub unit_test_dir: Option<PathBuf>,

    /// Directory to create temporary workspaces in.
    #[arg(long, value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// The workflow runner executable.
    #[arg(long, value_name = "PROGRAM")]
    pub runner: Option<String>,

    /// Enable conda environments for every rule test.
    #[arg(long)]
    pub use_conda: bool,

    /// Enable singularity containers for every rule test.
    #[arg(long)]
    pub use_singularity: bool,

    /// Number of rule tests to run at once (0 = one per CPU).
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Kill a runner that has not finished after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Stop starting new rule tests after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// Report format.
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Log level filter, e.g. `debug` or `ruletest=trace`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Only run the rule tests with these names.
    #[arg(value_name = "RULE")]
    pub rules: Vec<String>,
}

impl Cli {
    /// Deployment modes requested on the command line, if any flag was given.
    pub fn deploy_modes(&self) -> Option<Vec<DeployMode>> {
        let mut modes = Vec::new();
        if self.use_conda {
            modes.push(DeployMode::Conda);
        }
        if self.use_singularity {
            modes.push(DeployMode::Singularity);
        }
        (!modes.is_empty()).then_some(modes)
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        // Only flags that were actually given override lower layers.
        let mut figment = Figment::new();

        if let Some(manifest) = &self.manifest {
            figment = figment.merge(Serialized::default("manifest", manifest));
        }
        if let Some(dir) = &self.unit_test_dir {
            figment = figment.merge(Serialized::default("unit_test_dir", dir));
        }
        if let Some(dir) = &self.workspace_root {
            figment = figment.merge(Serialized::default("workspace_root", dir));
        }
        if let Some(program) = &self.runner {
            figment = figment.merge(Serialized::default("runner.program", program));
        }
        if let Some(modes) = self.deploy_modes() {
            figment = figment.merge(Serialized::default("deploy", modes));
        }
        if let Some(jobs) = self.jobs {
            figment = figment.merge(Serialized::default("suite.jobs", jobs));
        }
        if let Some(timeout) = self.timeout_seconds {
            figment = figment.merge(Serialized::default("runner.timeout_seconds", timeout));
        }
        if self.fail_fast {
            figment = figment.merge(Serialized::default("suite.keep_going", false));
        }
        if let Some(format) = self.format {
            figment = figment.merge(Serialized::default("output.format", format));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("log_level", level));
        }

        figment.data()
    }
}
