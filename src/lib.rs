//! ruletest - fixture-based unit tests for workflow rules
//!
//! Each rule test copies a fixture into a fresh temporary workspace, runs the
//! workflow engine for a single target, and compares the produced files with
//! the expected outputs.

pub mod app;
pub mod checker;
pub mod cli;
pub mod config;
pub mod core;
pub mod executor;
pub mod formatting;
pub mod manifest;
pub mod runner;
pub mod suite;
pub mod workspace;

// Re-export core types for convenience
pub use crate::core::*;
pub use executor::{run_rule_test, RuleTest, RuleTestError, TestEnvironment};
