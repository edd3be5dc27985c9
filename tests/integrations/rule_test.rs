//! End-to-end rule tests against a fake runner executable.
#![cfg(unix)]

use anyhow::Result;
use ruletest::checker::OutputCheckerFactory;
use ruletest::core::DeployMode;
use ruletest::executor::{run_rule_test, RuleTestError};
use ruletest::runner::SubprocessRunner;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::fake_runner::{logged_args, logged_workdir, write_fake_runner, Behavior};
use helpers::UnitTestDir;

#[tokio::test]
async fn test_passing_rule_invokes_runner_and_cleans_up() -> Result<()> {
    let unit = UnitTestDir::new();
    let case = unit.add_count_lines("count_lines", "3");
    let bin = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::CountLines));

    run_rule_test(&case, &runner, &OutputCheckerFactory, None).await?;

    let workdir = logged_workdir(bin.path(), &case.target).expect("runner should have run");
    assert_eq!(workdir.file_name().unwrap(), "workdir");
    assert_eq!(
        logged_args(bin.path(), &case.target).unwrap(),
        format!("results/counts.txt -F -j1 --directory {}", workdir.display())
    );
    assert!(!workdir.exists());
    assert!(!workdir.parent().unwrap().exists());
    Ok(())
}

#[tokio::test]
async fn test_deploy_modes_become_flags() -> Result<()> {
    let unit = UnitTestDir::new();
    let case = unit
        .add_count_lines("count_lines", "3")
        .with_deploy_modes([DeployMode::Singularity, DeployMode::Conda]);
    let bin = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::CountLines));

    run_rule_test(&case, &runner, &OutputCheckerFactory, None).await?;

    let args = logged_args(bin.path(), &case.target).unwrap();
    assert!(
        args.starts_with("results/counts.txt -F -j1 --use-conda --use-singularity --directory "),
        "{args}"
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_output_is_a_mismatch_naming_the_artifact() -> Result<()> {
    let unit = UnitTestDir::new();
    let case = unit.add_count_lines("count_lines", "3");
    let bin = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::WrongCount));

    let err = run_rule_test(&case, &runner, &OutputCheckerFactory, None)
        .await
        .unwrap_err();
    match &err {
        RuleTestError::OutputMismatch(m) => {
            assert_eq!(m.artifacts(), vec![Path::new("results/counts.txt")]);
        }
        other => panic!("expected OutputMismatch, got {other:?}"),
    }
    assert!(err.to_string().contains("results/counts.txt differs"));

    let workdir = logged_workdir(bin.path(), &case.target).unwrap();
    assert!(!workdir.parent().unwrap().exists());
    Ok(())
}

#[tokio::test]
async fn test_runner_failure_reports_exit_code_and_output() -> Result<()> {
    let unit = UnitTestDir::new();
    let case = unit.add_count_lines("count_lines", "3");
    let bin = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::Fail(3)));

    let err = run_rule_test(&case, &runner, &OutputCheckerFactory, None)
        .await
        .unwrap_err();
    match err {
        RuleTestError::RunnerExecution { exit_code, output } => {
            assert_eq!(exit_code, Some(3));
            assert!(output.contains("building results/counts.txt"));
            assert!(output.contains("MissingRuleException"));
        }
        other => panic!("expected RunnerExecution, got {other:?}"),
    }

    let workdir = logged_workdir(bin.path(), &case.target).unwrap();
    assert!(!workdir.parent().unwrap().exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_fixture_never_starts_runner() -> Result<()> {
    let unit = UnitTestDir::new();
    let mut case = unit.add_count_lines("count_lines", "3");
    case.data_path = unit.path().join("count_lines").join("missing");
    let bin = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::CountLines));
    let scratch = TempDir::new()?;

    let err = run_rule_test(&case, &runner, &OutputCheckerFactory, Some(scratch.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, RuleTestError::FixtureCopy { .. }), "{err:?}");
    assert!(logged_args(bin.path(), &case.target).is_none());
    assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_timeout_kills_runner_and_cleans_up() -> Result<()> {
    let unit = UnitTestDir::new();
    let case = unit.add_count_lines("count_lines", "3");
    let bin = TempDir::new()?;
    let scratch = TempDir::new()?;
    let runner = SubprocessRunner::new(write_fake_runner(bin.path(), Behavior::Hang))
        .with_timeout(Some(Duration::from_secs(1)));

    let err = run_rule_test(&case, &runner, &OutputCheckerFactory, Some(scratch.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, RuleTestError::RunnerTimeout { seconds: 1 }), "{err:?}");
    assert_eq!(std::fs::read_dir(scratch.path())?.count(), 0);
    Ok(())
}
