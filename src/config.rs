//! Configuration management for ruletest
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer, in increasing priority: built-in defaults,
//! a `ruletest.toml` file, `RULETEST_` environment variables, and the
//! command-line arguments.

use crate::cli::Cli;
use crate::core::DeployMode;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Config file read when no `--config` is given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "ruletest.toml";
/// Manifest file name looked up inside the unit test directory.
pub const DEFAULT_MANIFEST_NAME: &str = "ruletests.yml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Directory holding the manifest and the per-rule fixtures.
    pub unit_test_dir: PathBuf,
    /// Explicit manifest path; defaults to `<unit_test_dir>/ruletests.yml`.
    pub manifest: Option<PathBuf>,
    /// Parent directory for workspaces; defaults to the system temp dir.
    pub workspace_root: Option<PathBuf>,
    /// Deployment modes applied to every case without its own `deploy`.
    pub deploy: Vec<DeployMode>,
    /// Configuration for the workflow runner.
    pub runner: RunnerConfig,
    /// Configuration for suite scheduling.
    pub suite: SuiteConfig,
    /// Configuration for the report.
    pub output: OutputConfig,
}

/// Configuration for the workflow runner subprocess.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunnerConfig {
    /// The runner executable.
    pub program: String,
    /// Arguments appended after the deployment flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Kill a run after this many seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Configuration for suite scheduling.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SuiteConfig {
    /// How many rule tests may run at once. `0` means one per CPU.
    pub jobs: usize,
    /// Keep starting new tests after a failure.
    pub keep_going: bool,
}

/// The format of the final report.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Json,
    PlainText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::PlainText => write!(f, "plain-text"),
        }
    }
}

/// Configuration for the report.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// The format to use for stdout output.
    pub format: OutputFormat,
}

impl Config {
    /// Loads the configuration, layering file, environment and CLI over the
    /// defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_file = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found at {}", path.display());
                }
                path.clone()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            // Nested keys use a double underscore, e.g. RULETEST_RUNNER__PROGRAM=snakemake
            .merge(Env::prefixed("RULETEST_").split("__"))
            .merge(cli.clone())
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.runner.program.trim().is_empty() {
            bail!("runner.program must not be empty");
        }
        if self.runner.timeout_seconds == Some(0) {
            bail!("runner.timeout_seconds must be greater than zero");
        }
        Ok(())
    }

    /// The manifest to read the test cases from.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.unit_test_dir.join(DEFAULT_MANIFEST_NAME))
    }

    /// The configured deployment modes as a set.
    pub fn deploy_modes(&self) -> BTreeSet<DeployMode> {
        self.deploy.iter().copied().collect()
    }

    /// The number of tests that may run concurrently, never zero.
    pub fn effective_jobs(&self) -> usize {
        match self.suite.jobs {
            0 => num_cpus::get().max(1),
            jobs => jobs,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            unit_test_dir: PathBuf::from(".tests/unit"),
            manifest: None,
            workspace_root: None,
            deploy: vec![],
            runner: RunnerConfig {
                program: "snakemake".to_string(),
                extra_args: vec![],
                timeout_seconds: None,
            },
            suite: SuiteConfig {
                jobs: 1,
                keep_going: true,
            },
            output: OutputConfig {
                format: OutputFormat::PlainText,
            },
        }
    }
}
