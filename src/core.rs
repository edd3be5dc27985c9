//! Core domain types and service traits for ruletest
//!
//! This module defines the test case parameters and the trait contracts for
//! the two collaborators of a rule test: the workflow runner and the output
//! verifier.

use crate::executor::RuleTestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An execution-environment strategy the workflow runner should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Resolve per-rule software environments with conda.
    Conda,
    /// Run rules inside singularity containers.
    Singularity,
}

impl DeployMode {
    /// The runner flag that enables this mode.
    pub fn runner_flag(self) -> &'static str {
        match self {
            DeployMode::Conda => "--use-conda",
            DeployMode::Singularity => "--use-singularity",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployMode::Conda => write!(f, "conda"),
            DeployMode::Singularity => write!(f, "singularity"),
        }
    }
}

impl FromStr for DeployMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conda" => Ok(DeployMode::Conda),
            "singularity" => Ok(DeployMode::Singularity),
            other => Err(anyhow::anyhow!("unknown deployment mode '{}'", other)),
        }
    }
}

/// The parameters of a single rule test.
///
/// A case is immutable once built: the runner target, the fixture root that
/// seeds the workspace and the reference root the outputs are compared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTestCase {
    /// Name of the rule under test.
    pub name: String,
    /// The output requested from the workflow runner.
    pub target: String,
    /// Fixture root copied into the workspace before the run.
    pub data_path: PathBuf,
    /// Reference root holding the expected outputs.
    pub expected_path: PathBuf,
    /// Deployment modes enabled for the run.
    pub deploy_modes: BTreeSet<DeployMode>,
}

impl RuleTestCase {
    /// Creates a case with no deployment modes.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        data_path: impl Into<PathBuf>,
        expected_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            data_path: data_path.into(),
            expected_path: expected_path.into(),
            deploy_modes: BTreeSet::new(),
        }
    }

    /// Replaces the deployment modes of this case. Duplicates collapse.
    pub fn with_deploy_modes<I>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = DeployMode>,
    {
        self.deploy_modes = modes.into_iter().collect();
        self
    }
}

/// A single request to the workflow runner.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    /// The output to build.
    pub target: &'a str,
    /// Execution root of the run.
    pub workdir: &'a Path,
    /// Deployment modes to enable.
    pub deploy_modes: &'a BTreeSet<DeployMode>,
}

/// A workflow engine that can build one target inside a working directory.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Runs the workflow to completion. Any failure is definitive; callers
    /// never retry.
    async fn run(&self, request: RunRequest<'_>) -> Result<(), RuleTestError>;
}

/// Compares the outputs of a finished run against the expected outputs.
pub trait OutputVerifier: Send {
    fn check(&self) -> Result<(), RuleTestError>;
}

/// Builds an [`OutputVerifier`] for one run from its three roots.
pub trait VerifierFactory: Send + Sync {
    fn build(
        &self,
        data_path: &Path,
        expected_path: &Path,
        workdir: &Path,
    ) -> Box<dyn OutputVerifier>;
}

impl<F> VerifierFactory for F
where
    F: Fn(&Path, &Path, &Path) -> Box<dyn OutputVerifier> + Send + Sync,
{
    fn build(
        &self,
        data_path: &Path,
        expected_path: &Path,
        workdir: &Path,
    ) -> Box<dyn OutputVerifier> {
        self(data_path, expected_path, workdir)
    }
}
