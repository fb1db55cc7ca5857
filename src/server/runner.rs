//! Test runner service
//!
//! `POST /run-tests` executes generated tests against generated code with
//! pytest and returns the parsed outcome.

use std::process::Stdio;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use super::error::AppError;
use crate::core::runner::{PytestRunner, TestExecutionRequest, TestExecutionResponse};
use crate::core::state_manager::StateManager;

#[derive(Clone)]
pub struct RunnerState {
    runner: PytestRunner,
    python: String,
    state_manager: Option<Arc<StateManager>>,
}

impl RunnerState {
    pub fn new(python: impl Into<String>) -> Self {
        let python = python.into();
        Self {
            runner: PytestRunner::new(python.clone()),
            python,
            state_manager: None,
        }
    }

    /// Persist results of runs that carry a `workflow_id`
    pub fn with_state_manager(mut self, manager: Arc<StateManager>) -> Self {
        self.state_manager = Some(manager);
        self
    }
}

pub fn router(state: RunnerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run-tests", post(run_tests))
        .with_state(state)
}

async fn health(State(state): State<RunnerState>) -> Json<Value> {
    let pytest_available = python_succeeds(&state.python, &["-m", "pytest", "--version"]).await;
    let coverage_available = python_succeeds(&state.python, &["-c", "import pytest_cov"]).await;
    Json(json!({
        "status": "healthy",
        "service": "AI Rails Test Runner",
        "pytest_available": pytest_available,
        "coverage_available": coverage_available,
    }))
}

async fn python_succeeds(python: &str, args: &[&str]) -> bool {
    Command::new(python)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn run_tests(
    State(state): State<RunnerState>,
    payload: Result<Json<TestExecutionRequest>, JsonRejection>,
) -> Result<Json<TestExecutionResponse>, AppError> {
    let Json(request) = payload?;
    request.check_supported()?;

    info!(
        workflow = request.workflow_id.as_deref().unwrap_or("-"),
        timeout = request.timeout,
        "Running tests"
    );
    let response = state
        .runner
        .run(&request.test_code, &request.implementation_code, request.timeout)
        .await;

    if let (Some(workflow_id), Some(manager)) = (&request.workflow_id, &state.state_manager) {
        let results = response.to_test_results(workflow_id);
        if !manager.save_test_results(&results).await {
            warn!("Test results for {} not persisted", workflow_id);
        }
    }

    Ok(Json(response))
}
