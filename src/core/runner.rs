//! Pytest execution
//!
//! Writes generated code and tests into a scratch directory, runs pytest with
//! coverage on them and parses what comes back.
//!
//! ```text
//! tmp/
//! ├── implementation.py        generated code
//! ├── test_implementation.py   generated tests (+ import line)
//! └── coverage.json            written by pytest-cov
//! ```

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::workflow::TestResults;
use crate::error::RailsError;

const IMPLEMENTATION_FILE: &str = "implementation.py";
const TEST_FILE: &str = "test_implementation.py";
const FAILED_MESSAGE: &str = "Test failed - check output for details";

/// Request to run tests against code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecutionRequest {
    pub test_code: String,
    pub implementation_code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_framework")]
    pub test_framework: String,
    /// Per-test timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

fn default_language() -> String {
    "python".to_string()
}

fn default_framework() -> String {
    "pytest".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Longest per-test timeout a caller may ask for
pub const MAX_TIMEOUT_SECS: u64 = 3600;

impl TestExecutionRequest {
    pub fn new(test_code: impl Into<String>, implementation_code: impl Into<String>) -> Self {
        Self {
            test_code: test_code.into(),
            implementation_code: implementation_code.into(),
            language: default_language(),
            test_framework: default_framework(),
            timeout: default_timeout(),
            workflow_id: None,
        }
    }

    /// Only Python with pytest is supported, with a timeout in range
    pub fn check_supported(&self) -> Result<(), RailsError> {
        if self.timeout == 0 || self.timeout > MAX_TIMEOUT_SECS {
            return Err(RailsError::TimeoutOutOfRange {
                got: self.timeout,
                max: MAX_TIMEOUT_SECS,
            });
        }
        if !self.language.eq_ignore_ascii_case("python") {
            return Err(RailsError::UnsupportedLanguage(self.language.clone()));
        }
        if !self.test_framework.eq_ignore_ascii_case("pytest") {
            return Err(RailsError::UnsupportedFramework(self.test_framework.clone()));
        }
        Ok(())
    }
}

/// Individual test result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_name: String,
    pub passed: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Response from test execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecutionResponse {
    pub success: bool,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub test_results: Vec<TestCaseResult>,
    #[serde(default)]
    pub coverage: Option<f64>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: f64,
}

impl TestExecutionResponse {
    fn failure(stderr: String, started: Instant) -> Self {
        Self {
            success: false,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            test_results: Vec::new(),
            coverage: None,
            stdout: String::new(),
            stderr,
            execution_time: started.elapsed().as_secs_f64(),
        }
    }

    /// Convert into a persistable record
    pub fn to_test_results(&self, workflow_id: &str) -> TestResults {
        let failure_details: Vec<_> = self
            .test_results
            .iter()
            .filter(|t| !t.passed)
            .map(|t| {
                let mut detail = serde_json::Map::new();
                detail.insert("test_name".into(), t.test_name.clone().into());
                if let Some(msg) = &t.error_message {
                    detail.insert("error_message".into(), msg.clone().into());
                }
                detail
            })
            .collect();

        TestResults {
            test_id: ulid::Ulid::new().to_string(),
            workflow_id: workflow_id.to_string(),
            test_suite: TEST_FILE.to_string(),
            passed: self.passed_tests,
            failed: self.failed_tests,
            skipped: 0,
            duration_seconds: self.execution_time.max(0.0),
            failure_details: (!failure_details.is_empty()).then_some(failure_details),
            coverage_percent: self.coverage.map(|c| c.clamp(0.0, 100.0)),
            executed_at: Utc::now(),
        }
    }
}

/// Runs pytest in a scratch directory
#[derive(Debug, Clone)]
pub struct PytestRunner {
    python: String,
    /// Slack on top of the per-test timeout before the whole run is killed
    grace: Duration,
}

impl PytestRunner {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            grace: Duration::from_secs(5),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Execute tests; failures to run at all come back as `success: false`
    pub async fn run(&self, test_code: &str, implementation_code: &str, timeout: u64) -> TestExecutionResponse {
        let started = Instant::now();

        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return TestExecutionResponse::failure(format!("Error running tests: {}", e), started)
            }
        };

        if let Err(e) = write_sources(dir.path(), test_code, implementation_code) {
            return TestExecutionResponse::failure(format!("Error running tests: {}", e), started);
        }

        let mut cmd = Command::new(&self.python);
        cmd.args(pytest_args(timeout))
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(python = %self.python, dir = %dir.path().display(), "Running pytest");
        let limit = Duration::from_secs(timeout).saturating_add(self.grace);

        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Err(_) => {
                warn!("Test execution timed out after {} seconds", timeout);
                return TestExecutionResponse::failure(
                    format!("Test execution timed out after {} seconds", timeout),
                    started,
                );
            }
            Ok(Err(e)) => {
                return TestExecutionResponse::failure(format!("Error running tests: {}", e), started)
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let (test_results, passed, failed) = parse_pytest_output(&stdout);
        let coverage = read_coverage_json(&dir.path().join("coverage.json"))
            .or_else(|| parse_total_coverage(&stdout));

        info!(passed, failed, ?coverage, "Test run finished");

        TestExecutionResponse {
            success: output.status.success(),
            total_tests: passed + failed,
            passed_tests: passed,
            failed_tests: failed,
            test_results,
            coverage,
            stdout,
            stderr,
            execution_time: started.elapsed().as_secs_f64(),
        }
    }
}

fn write_sources(dir: &Path, test_code: &str, implementation_code: &str) -> std::io::Result<()> {
    std::fs::write(dir.join(IMPLEMENTATION_FILE), implementation_code)?;
    std::fs::write(dir.join(TEST_FILE), prepare_test_code(test_code))
}

/// Prefix the star import unless the tests already import the implementation
pub fn prepare_test_code(test_code: &str) -> String {
    if test_code.contains("import implementation") || test_code.contains("from implementation") {
        test_code.to_string()
    } else {
        format!("from implementation import *\n\n{}", test_code)
    }
}

/// Arguments after the interpreter
pub fn pytest_args(timeout: u64) -> Vec<String> {
    vec![
        "-m".into(),
        "pytest".into(),
        TEST_FILE.into(),
        "-v".into(),
        "--tb=short".into(),
        format!("--timeout={}", timeout),
        "--no-header".into(),
        "-p".into(),
        "no:warnings".into(),
        "--cov=implementation".into(),
        "--cov-report=term-missing".into(),
        "--cov-report=json".into(),
    ]
}

fn summary_regexes() -> Option<&'static (Regex, Regex)> {
    static RE: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    RE.get_or_init(|| {
        Some((
            Regex::new(r"(\d+) passed").ok()?,
            Regex::new(r"(\d+) failed").ok()?,
        ))
    })
    .as_ref()
}

/// Per-test results from `-v` output, else counts from the summary line
pub fn parse_pytest_output(output: &str) -> (Vec<TestCaseResult>, u32, u32) {
    let mut results = Vec::new();
    let mut passed = 0;
    let mut failed = 0;

    for line in output.lines() {
        if !line.contains("::") || !(line.contains("PASSED") || line.contains("FAILED")) {
            continue;
        }
        let Some(name) = line.split("::").nth(1).and_then(|p| p.split_whitespace().next()) else {
            continue;
        };
        if line.contains("PASSED") {
            results.push(TestCaseResult {
                test_name: name.to_string(),
                passed: true,
                error_message: None,
                duration: None,
            });
            passed += 1;
        } else {
            results.push(TestCaseResult {
                test_name: name.to_string(),
                passed: false,
                error_message: Some(FAILED_MESSAGE.to_string()),
                duration: None,
            });
            failed += 1;
        }
    }

    if results.is_empty() {
        let count = |re: &Regex, line: &str| {
            re.captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        };
        let summary = output
            .lines()
            .find(|l| l.contains("passed") && l.contains("failed"));
        if let (Some((passed_re, failed_re)), Some(line)) = (summary_regexes(), summary) {
            passed = count(passed_re, line).unwrap_or(0);
            failed = count(failed_re, line).unwrap_or(0);
        }
    }

    (results, passed, failed)
}

/// `totals.percent_covered` from pytest-cov's JSON report
pub fn read_coverage_json(path: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("totals")?.get("percent_covered")?.as_f64()
}

/// Percentage from the `TOTAL` row of the terminal report
pub fn parse_total_coverage(output: &str) -> Option<f64> {
    output
        .lines()
        .filter(|l| l.contains("TOTAL") && l.contains('%'))
        .find_map(|l| {
            l.split_whitespace()
                .filter_map(|p| p.strip_suffix('%'))
                .find_map(|p| p.parse().ok())
        })
}
