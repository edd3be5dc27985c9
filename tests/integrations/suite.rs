//! Suite scheduling: ordering, concurrency bound, fail-fast and shutdown.

use async_trait::async_trait;
use ruletest::checker::OutputCheckerFactory;
use ruletest::core::{RunRequest, WorkflowRunner};
use ruletest::executor::{RuleTestError, TestEnvironment};
use ruletest::suite::{Outcome, Suite, SuiteOptions};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::UnitTestDir;

/// Counts lines in-process, tracking how many runs overlap.
struct InProcessRunner {
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: AtomicUsize,
}

impl InProcessRunner {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WorkflowRunner for InProcessRunner {
    async fn run(&self, request: RunRequest<'_>) -> Result<(), RuleTestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let input = fs::read_to_string(request.workdir.join("input.txt")).unwrap();
        let out = request.workdir.join(request.target);
        fs::create_dir_all(out.parent().unwrap()).unwrap();
        fs::write(out, format!("{}\n", input.lines().count())).unwrap();
        Ok(())
    }
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let unit = UnitTestDir::new();
    let cases = vec![
        unit.add_count_lines("first", "3"),
        unit.add_count_lines("second", "7"),
        unit.add_count_lines("third", "3"),
    ];
    let runner = Arc::new(InProcessRunner::new(Duration::from_millis(10)));
    let env = TestEnvironment::new(runner.clone(), Arc::new(OutputCheckerFactory));
    let suite = Suite::new(
        env.generate_all(cases),
        SuiteOptions {
            jobs: 3,
            keep_going: true,
        },
    );

    let (_tx, rx) = watch::channel(false);
    let report = suite.run(rx).await;

    let names: Vec<_> = report.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    assert!(report.cases[0].outcome.is_pass());
    assert!(matches!(
        report.cases[1].outcome,
        Outcome::Failed(RuleTestError::OutputMismatch(_))
    ));
    assert!(report.cases[2].outcome.is_pass());
    assert_eq!(report.passed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_concurrency_is_bounded_by_jobs() {
    let unit = UnitTestDir::new();
    let cases: Vec<_> = (0..6)
        .map(|i| unit.add_count_lines(&format!("rule_{i}"), "3"))
        .collect();
    let runner = Arc::new(InProcessRunner::new(Duration::from_millis(50)));
    let env = TestEnvironment::new(runner.clone(), Arc::new(OutputCheckerFactory));
    let suite = Suite::new(
        env.generate_all(cases),
        SuiteOptions {
            jobs: 2,
            keep_going: true,
        },
    );

    let (_tx, rx) = watch::channel(false);
    let report = suite.run(rx).await;

    assert!(report.is_success());
    assert_eq!(runner.calls.load(Ordering::SeqCst), 6);
    assert!(runner.max_running.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_fail_fast_skips_remaining_tests() {
    let unit = UnitTestDir::new();
    let cases = vec![
        unit.add_count_lines("broken", "100"),
        unit.add_count_lines("later_a", "3"),
        unit.add_count_lines("later_b", "3"),
    ];
    let runner = Arc::new(InProcessRunner::new(Duration::ZERO));
    let env = TestEnvironment::new(runner.clone(), Arc::new(OutputCheckerFactory));
    let suite = Suite::new(
        env.generate_all(cases),
        SuiteOptions {
            jobs: 1,
            keep_going: false,
        },
    );

    let (_tx, rx) = watch::channel(false);
    let report = suite.run(rx).await;

    assert!(matches!(report.cases[0].outcome, Outcome::Failed(_)));
    assert!(matches!(report.cases[1].outcome, Outcome::Skipped));
    assert!(matches!(report.cases[2].outcome, Outcome::Skipped));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_cancels_running_and_skips_pending() {
    let unit = UnitTestDir::new();
    let cases = vec![
        unit.add_count_lines("slow", "3"),
        unit.add_count_lines("pending", "3"),
    ];
    let scratch = tempfile::TempDir::new().unwrap();
    let runner = Arc::new(InProcessRunner::new(Duration::from_secs(30)));
    let env = TestEnvironment::new(runner.clone(), Arc::new(OutputCheckerFactory))
        .with_workspace_root(Some(scratch.path().to_path_buf()));
    let suite = Suite::new(
        env.generate_all(cases),
        SuiteOptions {
            jobs: 1,
            keep_going: true,
        },
    );

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn(suite.run(rx));
    while runner.calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(true).unwrap();
    let report = run.await.unwrap();

    assert!(matches!(report.cases[0].outcome, Outcome::Cancelled));
    assert!(matches!(report.cases[1].outcome, Outcome::Skipped));
    assert_eq!(report.not_run(), 2);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}
