//! Workflow records
//!
//! The three record kinds persisted by the state manager. All of them are
//! plain JSON documents; timestamps are stored as RFC 3339 UTC strings.
//!
//! # Key Properties
//! - **WorkflowState**: lives `ttl_hours` (1-720), `last_updated >= created_at`
//! - **ApprovalRequest**: lives until `expires_at`, which must follow `created_at`
//! - **TestResults**: kept for 30 days

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::InProgress => write!(f, "in_progress"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(WorkflowStatus::Pending),
            "in_progress" | "in-progress" => Ok(WorkflowStatus::InProgress),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            _ => anyhow::bail!("Unknown workflow status: {}", s),
        }
    }
}

/// What an approval request is asking a human to sign off on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Test,
    Code,
    Deploy,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Test => write!(f, "test"),
            RequestType::Code => write!(f, "code"),
            RequestType::Deploy => write!(f, "deploy"),
        }
    }
}

/// Approval decision status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Persistent state of one TDD workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub feature_description: String,
    pub current_stage: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
}

fn default_ttl_hours() -> u32 {
    24
}

impl WorkflowState {
    /// Create a fresh pending workflow
    pub fn new(
        workflow_id: impl Into<String>,
        feature_description: impl Into<String>,
        current_stage: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Pending,
            feature_description: feature_description.into(),
            current_stage: current_stage.into(),
            metadata: Map::new(),
            created_at: now,
            last_updated: now,
            ttl_hours: default_ttl_hours(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=720).contains(&self.ttl_hours) {
            return Err(ValidationError::TtlOutOfRange(self.ttl_hours));
        }
        if self.last_updated < self.created_at {
            return Err(ValidationError::UpdatedBeforeCreated);
        }
        Ok(())
    }

    /// TTL in seconds for the backing key
    pub fn ttl_seconds(&self) -> u64 {
        u64::from(self.ttl_hours) * 3600
    }
}

/// A request for a human decision on a workflow artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub workflow_id: String,
    pub request_type: RequestType,
    pub content: String,
    pub requester: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApprovalRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.expires_at <= self.created_at {
            return Err(ValidationError::ExpiresBeforeCreated);
        }
        Ok(())
    }

    /// Seconds until expiry, measured from `now`
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}

/// Results of one test suite execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub test_id: String,
    pub workflow_id: String,
    pub test_suite: String,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_details: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_percent: Option<f64>,
    pub executed_at: DateTime<Utc>,
}

impl TestResults {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration_seconds < 0.0 || self.duration_seconds.is_nan() {
            return Err(ValidationError::NegativeDuration(self.duration_seconds));
        }
        if let Some(cov) = self.coverage_percent {
            if !(0.0..=100.0).contains(&cov) {
                return Err(ValidationError::CoverageOutOfRange(cov));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped
    }
}

/// Parse a JSON document into a record and validate it
pub fn parse_record<T>(json: &str, validate: impl Fn(&T) -> Result<(), ValidationError>) -> Result<T, ValidationError>
where
    T: serde::de::DeserializeOwned,
{
    let record: T =
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    validate(&record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_workflow_is_valid() {
        let state = WorkflowState::new("wf-1", "Calculator", "planning");
        assert_eq!(state.status, WorkflowStatus::Pending);
        assert_eq!(state.ttl_hours, 24);
        assert!(state.validate().is_ok());
        assert_eq!(state.ttl_seconds(), 86_400);
    }

    #[test]
    fn test_ttl_bounds() {
        let mut state = WorkflowState::new("wf-1", "x", "s");
        state.ttl_hours = 0;
        assert_eq!(state.validate(), Err(ValidationError::TtlOutOfRange(0)));
        state.ttl_hours = 721;
        assert!(state.validate().is_err());
        state.ttl_hours = 720;
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_last_updated_before_created_rejected() {
        let mut state = WorkflowState::new("wf-1", "x", "s");
        state.last_updated = state.created_at - Duration::seconds(1);
        assert_eq!(state.validate(), Err(ValidationError::UpdatedBeforeCreated));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let mut state = WorkflowState::new("wf-1", "x", "s");
        state.status = WorkflowStatus::InProgress;
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "in_progress");
    }

    #[test]
    fn test_parse_accepts_zulu_and_offset_timestamps() {
        let json = r#"{
            "workflow_id": "wf-9",
            "status": "completed",
            "feature_description": "Email validator",
            "current_stage": "done",
            "created_at": "2024-01-01T10:00:00Z",
            "last_updated": "2024-01-01T12:00:00+02:00"
        }"#;
        let state: WorkflowState = parse_record(json, WorkflowState::validate).unwrap();
        assert_eq!(state.ttl_hours, 24);
        assert_eq!(state.last_updated, state.created_at);
    }

    #[test]
    fn test_approval_expiry_must_follow_creation() {
        let now = Utc::now();
        let req = ApprovalRequest {
            approval_id: "a1".into(),
            workflow_id: "wf-1".into(),
            request_type: RequestType::Test,
            content: "tests".into(),
            requester: "cli".into(),
            created_at: now,
            expires_at: now,
            status: ApprovalStatus::Pending,
            decided_at: None,
            notes: None,
        };
        assert_eq!(req.validate(), Err(ValidationError::ExpiresBeforeCreated));
    }

    #[test]
    fn test_results_coverage_bounds() {
        let mut results = TestResults {
            test_id: "t1".into(),
            workflow_id: "wf-1".into(),
            test_suite: "pytest".into(),
            passed: 3,
            failed: 1,
            skipped: 0,
            duration_seconds: 1.5,
            failure_details: None,
            coverage_percent: Some(87.5),
            executed_at: Utc::now(),
        };
        assert!(results.validate().is_ok());
        assert_eq!(results.total(), 4);

        results.coverage_percent = Some(120.0);
        assert!(results.validate().is_err());

        results.coverage_percent = None;
        results.duration_seconds = -1.0;
        assert!(results.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_validation_error() {
        let err = parse_record::<TestResults>("{not json", TestResults::validate).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }
}
