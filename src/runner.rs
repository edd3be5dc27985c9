//! Subprocess-based workflow runner.
//!
//! Invokes a snakemake-compatible executable as
//! `<program> <target> -F -j1 [mode flags] [extra args] --directory <workdir>`
//! and waits for it to exit.

use crate::config::RunnerConfig;
use crate::core::{RunRequest, WorkflowRunner};
use crate::executor::RuleTestError;
use async_trait::async_trait;
use log::{debug, warn};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Forces re-execution of the target regardless of existing outputs.
const FORCE_FLAG: &str = "-F";
/// The runner gets exactly one job slot.
const JOBS_FLAG: &str = "-j1";
const DIRECTORY_FLAG: &str = "--directory";

/// Runs the workflow engine as a child process.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    program: OsString,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessRunner {
    /// Creates a runner for the given executable with no extra arguments and
    /// no timeout.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Creates a runner from the `[runner]` configuration section.
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(&config.program)
            .with_extra_args(config.extra_args.clone())
            .with_timeout(config.timeout_seconds.map(Duration::from_secs))
    }

    /// Arguments appended after the deployment flags.
    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Kills the child and fails the run once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the argument vector (without the program) for a request.
    pub fn build_args(&self, request: &RunRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            request.target.into(),
            FORCE_FLAG.into(),
            JOBS_FLAG.into(),
        ];
        args.extend(
            request
                .deploy_modes
                .iter()
                .map(|mode| OsString::from(mode.runner_flag())),
        );
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(DIRECTORY_FLAG.into());
        args.push(request.workdir.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl WorkflowRunner for SubprocessRunner {
    async fn run(&self, request: RunRequest<'_>) -> Result<(), RuleTestError> {
        let args = self.build_args(&request);
        let program = self.program.to_string_lossy().into_owned();
        debug!(
            "Invoking runner: {} {}",
            program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuleTestError::Runner {
                program: program.clone(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(
                        "Runner for target {} exceeded {}s, killed",
                        request.target,
                        timeout.as_secs()
                    );
                    return Err(RuleTestError::RunnerTimeout {
                        seconds: timeout.as_secs(),
                    });
                }
            },
            None => wait.await,
        }
        .map_err(|source| RuleTestError::Runner {
            program: program.clone(),
            source,
        })?;

        if output.status.success() {
            debug!("Runner finished target {}", request.target);
            return Ok(());
        }

        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(RuleTestError::RunnerExecution {
            exit_code: output.status.code(),
            output: captured,
        })
    }
}
