//! The rule test executor.
//!
//! A rule test is a strictly linear sequence: acquire a workspace, copy the
//! fixture into it, run the workflow for one target, verify the outputs.
//! The workspace is released on every exit path.

use crate::checker::Mismatch;
use crate::core::{RuleTestCase, RunRequest, VerifierFactory, WorkflowRunner};
use crate::workspace::Workspace;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

/// Why a rule test failed. None of these are retried.
#[derive(Error, Debug)]
pub enum RuleTestError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to copy fixture {}: {source}", .path.display())]
    FixtureCopy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run workflow runner '{program}': {source}")]
    Runner {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("workflow runner exited with {}:\n{output}", describe_exit(.exit_code))]
    RunnerExecution {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("workflow runner timed out after {seconds}s")]
    RunnerTimeout { seconds: u64 },

    #[error("output mismatch: {0}")]
    OutputMismatch(Mismatch),

    #[error("failed to read outputs: {0}")]
    Checker(#[source] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Runs one rule test to completion.
///
/// The fixture is copied before the runner starts, the checker only runs
/// after a successful runner exit, and the workspace never outlives the call.
pub async fn run_rule_test(
    case: &RuleTestCase,
    runner: &dyn WorkflowRunner,
    verifiers: &dyn VerifierFactory,
    workspace_root: Option<&Path>,
) -> Result<(), RuleTestError> {
    let span = tracing::info_span!("rule_test", rule = %case.name, target = %case.target);
    async move {
        let workspace = Workspace::create(workspace_root)?;
        let result = execute(case, runner, verifiers, &workspace).await;
        // A failed removal is logged by `close` and does not change the verdict.
        let _ = workspace.close();
        match &result {
            Ok(()) => info!("Rule test {} passed", case.name),
            Err(e) => info!("Rule test {} failed: {}", case.name, e),
        }
        result
    }
    .instrument(span)
    .await
}

async fn execute(
    case: &RuleTestCase,
    runner: &dyn WorkflowRunner,
    verifiers: &dyn VerifierFactory,
    workspace: &Workspace,
) -> Result<(), RuleTestError> {
    workspace.materialize(&case.data_path)?;

    runner
        .run(RunRequest {
            target: &case.target,
            workdir: workspace.workdir(),
            deploy_modes: &case.deploy_modes,
        })
        .await?;

    debug!("Checking outputs of {}", case.name);
    verifiers
        .build(&case.data_path, &case.expected_path, workspace.workdir())
        .check()
}

/// The collaborators shared by every test generated from a set of cases.
#[derive(Clone)]
pub struct TestEnvironment {
    runner: Arc<dyn WorkflowRunner>,
    verifiers: Arc<dyn VerifierFactory>,
    workspace_root: Option<PathBuf>,
}

impl TestEnvironment {
    pub fn new(runner: Arc<dyn WorkflowRunner>, verifiers: Arc<dyn VerifierFactory>) -> Self {
        Self {
            runner,
            verifiers,
            workspace_root: None,
        }
    }

    /// Places workspaces under `root` instead of the system temp directory.
    pub fn with_workspace_root(mut self, root: Option<PathBuf>) -> Self {
        self.workspace_root = root;
        self
    }

    /// Turns a case into a runnable test bound to this environment.
    pub fn generate(&self, case: RuleTestCase) -> RuleTest {
        RuleTest {
            case,
            env: self.clone(),
        }
    }

    /// Generates one test per case, preserving order.
    pub fn generate_all(&self, cases: impl IntoIterator<Item = RuleTestCase>) -> Vec<RuleTest> {
        cases.into_iter().map(|case| self.generate(case)).collect()
    }
}

/// A zero-argument, runnable rule test.
#[derive(Clone)]
pub struct RuleTest {
    case: RuleTestCase,
    env: TestEnvironment,
}

impl RuleTest {
    pub fn case(&self) -> &RuleTestCase {
        &self.case
    }

    pub fn name(&self) -> &str {
        &self.case.name
    }

    pub async fn run(&self) -> Result<(), RuleTestError> {
        run_rule_test(
            &self.case,
            self.env.runner.as_ref(),
            self.env.verifiers.as_ref(),
            self.env.workspace_root.as_deref(),
        )
        .await
    }
}
