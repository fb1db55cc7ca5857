//! Workflow state manager
//!
//! Persists workflow states, approval requests and test results in Redis with
//! automatic expiration, falling back to in-memory storage when Redis is
//! unreachable and the fallback is enabled.
//!
//! Every operation logs its own failures and reports them as `false`/`None`,
//! so callers in the workflow never abort because persistence is down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::store::{BackendInfo, KvBackend, MemoryStore, RedisStore};
use super::workflow::{parse_record, ApprovalRequest, ApprovalStatus, TestResults, WorkflowState};
use crate::config::RedisConfig;

/// Test results are kept for 30 days
pub const TEST_RESULTS_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Decided approvals are kept for 24 hours
pub const DECIDED_APPROVAL_TTL: Duration = Duration::from_secs(24 * 3600);

/// Health report returned by `health_check`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub connected: bool,
    pub using_memory_fallback: bool,
    pub timestamp: String,
    pub status: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Key counts per record kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateStats {
    pub active_workflows: usize,
    pub approvals: usize,
    pub stored_test_results: usize,
    pub total_keys: usize,
}

/// Redis-backed state management with memory fallback
pub struct StateManager {
    config: RedisConfig,
    backend: Option<Arc<dyn KvBackend>>,
    using_memory: bool,
}

impl StateManager {
    /// Create an unconnected manager; call `connect` before use
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            backend: None,
            using_memory: false,
        }
    }

    /// Create a manager over an already-open backend
    pub fn with_backend(config: RedisConfig, backend: Arc<dyn KvBackend>) -> Self {
        let using_memory = backend.name() == "memory";
        Self {
            config,
            backend: Some(backend),
            using_memory,
        }
    }

    /// Create a manager backed only by memory
    pub fn in_memory() -> Self {
        Self::with_backend(RedisConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Connect to Redis, falling back to memory when allowed
    pub async fn connect(&mut self) -> Result<()> {
        let url = self.config.effective_url();
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let op_timeout = Duration::from_secs(self.config.op_timeout_secs);

        match RedisStore::connect(&url, connect_timeout, op_timeout).await {
            Ok(store) => {
                self.backend = Some(Arc::new(store));
                self.using_memory = false;
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to Redis: {:#}", e);
                if self.config.fallback_memory {
                    info!("Falling back to in-memory storage");
                    self.backend = Some(Arc::new(MemoryStore::new()));
                    self.using_memory = true;
                    Ok(())
                } else {
                    self.backend = None;
                    Err(e)
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_using_memory(&self) -> bool {
        self.using_memory
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}{}:{}", self.config.key_prefix, kind, id)
    }

    fn strip<'a>(&self, kind: &str, key: &'a str) -> &'a str {
        let prefix_len = self.config.key_prefix.len() + kind.len() + 1;
        key.get(prefix_len..).unwrap_or(key)
    }

    async fn put<T: Serialize>(&self, key: &str, record: &T, ttl: Duration) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!(key, "Failed to serialize record: {}", e);
                return false;
            }
        };
        match backend.set(key, &json, Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                error!(key, "Failed to store record: {:#}", e);
                false
            }
        }
    }

    async fn fetch(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                error!(key, "Failed to read record: {:#}", e);
                None
            }
        }
    }

    async fn list(&self, pattern: &str) -> Vec<String> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        match backend.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(pattern, "Failed to list keys: {:#}", e);
                Vec::new()
            }
        }
    }

    // ============== Workflows ==============

    /// Persist workflow state with TTL from `ttl_hours`
    pub async fn save_workflow_state(&self, state: &WorkflowState) -> bool {
        if let Err(e) = state.validate() {
            error!(workflow_id = %state.workflow_id, "Failed to save workflow state: {}", e);
            return false;
        }
        let key = self.key("workflow", &state.workflow_id);
        self.put(&key, state, Duration::from_secs(state.ttl_seconds()))
            .await
    }

    /// Retrieve workflow state by ID
    pub async fn get_workflow_state(&self, workflow_id: &str) -> Option<WorkflowState> {
        let json = self.fetch(&self.key("workflow", workflow_id)).await?;
        match parse_record(&json, WorkflowState::validate) {
            Ok(state) => Some(state),
            Err(e) => {
                error!(workflow_id, "Failed to get workflow state: {}", e);
                None
            }
        }
    }

    /// Partially update a workflow, preserving other fields and bumping `last_updated`
    pub async fn update_workflow_state(&self, workflow_id: &str, updates: Map<String, Value>) -> bool {
        let Some(existing) = self.get_workflow_state(workflow_id).await else {
            warn!("Workflow {} not found for update", workflow_id);
            return false;
        };

        let mut doc = match serde_json::to_value(&existing) {
            Ok(Value::Object(map)) => map,
            _ => return false,
        };
        for (k, v) in updates {
            if k == "workflow_id" {
                continue;
            }
            doc.insert(k, v);
        }
        doc.insert(
            "last_updated".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let updated = match parse_record::<WorkflowState>(
            &Value::Object(doc).to_string(),
            WorkflowState::validate,
        ) {
            Ok(state) => state,
            Err(e) => {
                error!(workflow_id, "Failed to update workflow state: {}", e);
                return false;
            }
        };

        self.save_workflow_state(&updated).await
    }

    /// IDs of all live workflows
    pub async fn list_workflows(&self) -> Vec<String> {
        let pattern = self.key("workflow", "*");
        self.list(&pattern)
            .await
            .iter()
            .map(|k| self.strip("workflow", k).to_string())
            .collect()
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        match backend.delete(&self.key("workflow", workflow_id)).await {
            Ok(existed) => existed,
            Err(e) => {
                error!(workflow_id, "Failed to delete workflow: {:#}", e);
                false
            }
        }
    }

    // ============== Approvals ==============

    /// Store an approval request until its `expires_at`
    pub async fn save_approval_request(&self, request: &ApprovalRequest) -> bool {
        if let Err(e) = request.validate() {
            error!(approval_id = %request.approval_id, "Failed to save approval request: {}", e);
            return false;
        }
        let remaining = request.remaining_seconds(Utc::now());
        if remaining <= 0 {
            warn!("Approval request {} already expired", request.approval_id);
            return false;
        }
        let key = self.key("approval", &request.approval_id);
        self.put(&key, request, Duration::from_secs(remaining as u64))
            .await
    }

    pub async fn get_approval_request(&self, approval_id: &str) -> Option<ApprovalRequest> {
        let json = self.fetch(&self.key("approval", approval_id)).await?;
        match parse_record(&json, ApprovalRequest::validate) {
            Ok(request) => Some(request),
            Err(e) => {
                error!(approval_id, "Failed to get approval request: {}", e);
                None
            }
        }
    }

    /// Record a decision; decided requests are kept for 24 hours
    pub async fn update_approval_status(&self, approval_id: &str, approved: bool, notes: &str) -> bool {
        let Some(mut request) = self.get_approval_request(approval_id).await else {
            warn!("Approval {} not found for decision", approval_id);
            return false;
        };

        let now = Utc::now();
        request.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        request.decided_at = Some(now);
        request.notes = Some(notes.to_string());
        // Decided requests are kept for exactly the key's lifetime
        request.expires_at = now
            + chrono::Duration::from_std(DECIDED_APPROVAL_TTL)
                .unwrap_or_else(|_| chrono::Duration::hours(24));

        let key = self.key("approval", approval_id);
        self.put(&key, &request, DECIDED_APPROVAL_TTL).await
    }

    pub async fn list_approvals(&self) -> Vec<String> {
        let pattern = self.key("approval", "*");
        self.list(&pattern)
            .await
            .iter()
            .map(|k| self.strip("approval", k).to_string())
            .collect()
    }

    // ============== Test Results ==============

    fn results_key(&self, workflow_id: &str, test_id: &str) -> String {
        self.key("test_results", &format!("{}:{}", workflow_id, test_id))
    }

    /// Store test execution results for 30 days
    pub async fn save_test_results(&self, results: &TestResults) -> bool {
        if let Err(e) = results.validate() {
            error!(test_id = %results.test_id, "Failed to save test results: {}", e);
            return false;
        }
        let key = self.results_key(&results.workflow_id, &results.test_id);
        self.put(&key, results, TEST_RESULTS_TTL).await
    }

    pub async fn get_test_results(&self, workflow_id: &str, test_id: &str) -> Option<TestResults> {
        let json = self.fetch(&self.results_key(workflow_id, test_id)).await?;
        match parse_record(&json, TestResults::validate) {
            Ok(results) => Some(results),
            Err(e) => {
                error!(test_id, "Failed to get test results: {}", e);
                None
            }
        }
    }

    /// All stored results for a workflow, oldest first
    pub async fn list_test_results(&self, workflow_id: &str) -> Vec<TestResults> {
        let pattern = self.results_key(workflow_id, "*");
        let mut results = Vec::new();
        for key in self.list(&pattern).await {
            if let Some(json) = self.fetch(&key).await {
                match parse_record(&json, TestResults::validate) {
                    Ok(r) => results.push(r),
                    Err(e) => warn!(key, "Skipping unreadable test results: {}", e),
                }
            }
        }
        results.sort_by_key(|r| r.executed_at);
        results
    }

    // ============== Health ==============

    /// Report connection health and backend stats
    pub async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport {
            connected: self.is_connected(),
            using_memory_fallback: self.using_memory,
            timestamp: Utc::now().to_rfc3339(),
            status: "disconnected".to_string(),
            backend: None,
            error: None,
        };

        let Some(backend) = &self.backend else {
            return report;
        };

        let probe = async {
            backend.ping().await?;
            backend.info().await
        };
        match probe.await {
            Ok(info) => {
                report.status = "healthy".to_string();
                report.backend = Some(info);
            }
            Err(e) => {
                error!("Health check failed: {:#}", e);
                report.status = "unhealthy".to_string();
                report.error = Some(format!("{:#}", e));
            }
        }
        report
    }

    pub async fn stats(&self) -> StateStats {
        let total_keys = match &self.backend {
            Some(backend) => backend
                .info()
                .await
                .ok()
                .and_then(|i| i.keys)
                .unwrap_or(0),
            None => 0,
        };
        StateStats {
            active_workflows: self.list(&self.key("workflow", "*")).await.len(),
            approvals: self.list(&self.key("approval", "*")).await.len(),
            stored_test_results: self.list(&self.key("test_results", "*")).await.len(),
            total_keys,
        }
    }

    /// Drop the backend connection
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            info!("State backend closed");
        }
        self.using_memory = false;
    }
}
