//! `ai-rails run-tests` command
//!
//! Runs generated tests against generated code, locally or through a
//! running test runner service.
//!
//! # Usage
//! ```bash
//! ai-rails run-tests --tests generated_tests.py --implementation generated_code.py
//! ai-rails run-tests --tests t.py --implementation c.py --server http://localhost:8001
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::utils::{read_input, state_manager};
use crate::config::Config;
use crate::core::runner::{PytestRunner, TestExecutionRequest, TestExecutionResponse};

#[derive(Args, Debug)]
pub struct RunTestsArgs {
    /// Test content or file path
    #[arg(long)]
    pub tests: String,

    /// Implementation content or file path
    #[arg(long)]
    pub implementation: String,

    /// Per-test timeout in seconds (default from config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Save results under this workflow
    #[arg(long)]
    pub workflow_id: Option<String>,

    /// Test runner service URL instead of running locally
    #[arg(long)]
    pub server: Option<String>,

    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RunTestsArgs, config: &Config) -> Result<()> {
    let mut request = TestExecutionRequest::new(
        read_input(&args.tests)?,
        read_input(&args.implementation)?,
    );
    request.timeout = args.timeout.unwrap_or(config.runner.timeout_secs);
    request.workflow_id = args.workflow_id.clone();

    let response = match &args.server {
        Some(url) => run_remote(url, &request).await?,
        None => {
            request.check_supported()?;
            eprintln!("🧪 Running tests with {}...", config.runner.python);
            let response = PytestRunner::new(&config.runner.python)
                .run(&request.test_code, &request.implementation_code, request.timeout)
                .await;
            if let Some(workflow_id) = &request.workflow_id {
                let manager = state_manager(config).await?;
                if manager.save_test_results(&response.to_test_results(workflow_id)).await {
                    eprintln!("💾 Results saved for {}", workflow_id);
                }
            }
            response
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_summary(&response);
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_remote(url: &str, request: &TestExecutionRequest) -> Result<TestExecutionResponse> {
    let endpoint = format!("{}/run-tests", url.trim_end_matches('/'));
    let resp = reqwest::Client::new()
        .post(&endpoint)
        .json(request)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Test runner returned {}: {}", status, body);
    }
    resp.json().await.context("Failed to parse test runner response")
}

fn print_summary(response: &TestExecutionResponse) {
    for result in &response.test_results {
        let mark = if result.passed {
            "PASSED".green()
        } else {
            "FAILED".red()
        };
        println!("  {} {}", mark, result.test_name);
    }

    let headline = format!(
        "{} passed, {} failed ({:.2}s)",
        response.passed_tests, response.failed_tests, response.execution_time
    );
    if response.success {
        println!("\n✅ {}", headline.green());
    } else {
        println!("\n❌ {}", headline.red());
    }
    if let Some(coverage) = response.coverage {
        println!("📈 Coverage: {:.1}%", coverage);
    }
    if !response.success && !response.stderr.trim().is_empty() {
        println!("\n{}", response.stderr.trim().dimmed());
    }
}
