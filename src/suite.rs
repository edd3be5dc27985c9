//! Runs a set of rule tests with bounded concurrency.
//!
//! Every test owns its own workspace, so tests never interfere with each
//! other. A shutdown signal stops new tests from starting and cancels those
//! in flight; cancelling a test kills its runner and removes its workspace.

use crate::executor::{RuleTest, RuleTestError};
use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};

/// Scheduling options for a suite run.
#[derive(Debug, Clone, Copy)]
pub struct SuiteOptions {
    /// Maximum number of tests running at once.
    pub jobs: usize,
    /// Keep starting tests after a failure.
    pub keep_going: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            keep_going: true,
        }
    }
}

/// The verdict for one rule test.
#[derive(Debug)]
pub enum Outcome {
    Passed,
    Failed(RuleTestError),
    /// Interrupted by shutdown while running.
    Cancelled,
    /// Never started, because of shutdown or an earlier failure.
    Skipped,
    /// The test task panicked.
    Panicked(String),
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "PASS",
            Outcome::Failed(_) => "FAIL",
            Outcome::Cancelled => "CANCELLED",
            Outcome::Skipped => "SKIP",
            Outcome::Panicked(_) => "PANIC",
        }
    }
}

/// The result of one rule test within a suite.
#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub target: String,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// The results of a suite run, in the order the tests were given.
#[derive(Debug)]
pub struct SuiteReport {
    /// RFC 3339 timestamp of the start of the run.
    pub started_at: String,
    pub elapsed: Duration,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| o.is_pass())
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_) | Outcome::Panicked(_)))
    }

    pub fn not_run(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Cancelled | Outcome::Skipped))
    }

    /// True when every test ran and passed.
    pub fn is_success(&self) -> bool {
        self.cases.iter().all(|c| c.outcome.is_pass())
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.cases.iter().filter(|c| predicate(&c.outcome)).count()
    }
}

/// A list of generated rule tests plus scheduling options.
pub struct Suite {
    tests: Vec<RuleTest>,
    options: SuiteOptions,
}

impl Suite {
    pub fn new(tests: Vec<RuleTest>, options: SuiteOptions) -> Self {
        Self { tests, options }
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Runs every test and waits for all of them.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> SuiteReport {
        let started_at = Utc::now().to_rfc3339();
        let start = Instant::now();
        let jobs = self.options.jobs.max(1);
        info!("Running {} rule test(s), {} at a time", self.tests.len(), jobs);

        let semaphore = Arc::new(Semaphore::new(jobs));
        let stop = Arc::new(AtomicBool::new(false));
        let keep_going = self.options.keep_going;

        let (meta, handles): (Vec<_>, Vec<_>) = self
            .tests
            .into_iter()
            .map(|test| {
                let name = test.name().to_string();
                let target = test.case().target.clone();
                let semaphore = semaphore.clone();
                let stop = stop.clone();
                let mut shutdown_rx = shutdown_rx.clone();

                let handle = tokio::spawn(async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = shutdown_signalled(&mut shutdown_rx) => return (Outcome::Skipped, Duration::ZERO),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return (Outcome::Skipped, Duration::ZERO),
                        },
                    };
                    if stop.load(Ordering::SeqCst) {
                        return (Outcome::Skipped, Duration::ZERO);
                    }

                    let started = Instant::now();
                    let outcome = tokio::select! {
                        biased;
                        _ = shutdown_signalled(&mut shutdown_rx) => {
                            warn!("Rule test {} cancelled by shutdown", test.name());
                            Outcome::Cancelled
                        }
                        result = test.run() => match result {
                            Ok(()) => Outcome::Passed,
                            Err(e) => {
                                if !keep_going {
                                    stop.store(true, Ordering::SeqCst);
                                }
                                Outcome::Failed(e)
                            }
                        },
                    };
                    (outcome, started.elapsed())
                });
                ((name, target), handle)
            })
            .unzip();

        let cases = join_all(handles)
            .await
            .into_iter()
            .zip(meta)
            .map(|(joined, (name, target))| {
                let (outcome, elapsed) = joined.unwrap_or_else(|e| {
                    error!("Rule test {} panicked: {:?}", name, e);
                    (Outcome::Panicked(e.to_string()), Duration::ZERO)
                });
                CaseReport {
                    name,
                    target,
                    outcome,
                    elapsed,
                }
            })
            .collect();

        let report = SuiteReport {
            started_at,
            elapsed: start.elapsed(),
            cases,
        };
        info!(
            "Suite finished: {} passed, {} failed, {} not run",
            report.passed(),
            report.failed(),
            report.not_run()
        );
        report
    }
}

/// Resolves once shutdown has been signalled. Never resolves if the sender
/// is gone without signalling.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}
