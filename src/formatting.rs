// src/formatting.rs

use crate::config::OutputFormat;
use crate::suite::{CaseReport, Outcome, SuiteReport};
use serde::Serialize;

/// A trait for rendering a suite report into a single string.
pub trait ReportFormatter: Send + Sync {
    fn format_report(&self, report: &SuiteReport) -> String;
}

/// Returns the formatter for the configured output format.
pub fn formatter_for(format: OutputFormat) -> Box<dyn ReportFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::PlainText => Box::new(PlainTextFormatter),
    }
}

/// One line per test, failure details indented below, and a summary line.
pub struct PlainTextFormatter;

impl PlainTextFormatter {
    fn format_case(&self, case: &CaseReport) -> String {
        let mut line = format!(
            "{} {} ({}) {:.2}s",
            case.outcome.label(),
            case.name,
            case.target,
            case.elapsed.as_secs_f64()
        );
        if let Some(detail) = failure_detail(&case.outcome) {
            for detail_line in detail.lines() {
                line.push_str("\n    ");
                line.push_str(detail_line);
            }
        }
        line
    }
}

impl ReportFormatter for PlainTextFormatter {
    fn format_report(&self, report: &SuiteReport) -> String {
        let mut lines: Vec<String> = report.cases.iter().map(|c| self.format_case(c)).collect();
        lines.push(format!(
            "{} rule test(s): {} passed, {} failed, {} not run ({:.2}s)",
            report.cases.len(),
            report.passed(),
            report.failed(),
            report.not_run(),
            report.elapsed.as_secs_f64()
        ));
        lines.join("\n")
    }
}

/// A single pretty-printed JSON document.
pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonReport<'a> {
    started_at: &'a str,
    elapsed_seconds: f64,
    passed: usize,
    failed: usize,
    not_run: usize,
    success: bool,
    cases: Vec<JsonCase<'a>>,
}

#[derive(Serialize)]
struct JsonCase<'a> {
    name: &'a str,
    target: &'a str,
    outcome: &'static str,
    elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<String>,
}

impl ReportFormatter for JsonFormatter {
    fn format_report(&self, report: &SuiteReport) -> String {
        let json = JsonReport {
            started_at: &report.started_at,
            elapsed_seconds: report.elapsed.as_secs_f64(),
            passed: report.passed(),
            failed: report.failed(),
            not_run: report.not_run(),
            success: report.is_success(),
            cases: report
                .cases
                .iter()
                .map(|case| JsonCase {
                    name: &case.name,
                    target: &case.target,
                    outcome: case.outcome.label(),
                    elapsed_seconds: case.elapsed.as_secs_f64(),
                    error: failure_detail(&case.outcome),
                    artifacts: mismatched_artifacts(&case.outcome),
                })
                .collect(),
        };
        // Serializing plain structs of strings and numbers cannot fail.
        serde_json::to_string_pretty(&json).unwrap_or_default()
    }
}

fn failure_detail(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Failed(e) => Some(e.to_string()),
        Outcome::Panicked(message) => Some(message.clone()),
        _ => None,
    }
}

fn mismatched_artifacts(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::Failed(crate::executor::RuleTestError::OutputMismatch(m)) => m
            .artifacts()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        _ => Vec::new(),
    }
}
