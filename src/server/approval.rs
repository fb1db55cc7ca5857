//! Approval webhook server
//!
//! Workflow engines post generated tests here; a human reviews them on an
//! HTML page and the decision is polled back through `check-approval`.
//!
//! ```text
//! POST /webhook/approval-request        -> { approval_id, approval_url }
//! GET  /approve/{id}                    -> review page
//! POST /webhook/approval-response/{id}  <- { approved, feedback }
//! GET  /webhook/check-approval/{id}     -> { status, response }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::error::AppError;
use super::html::render_approval_page;
use crate::core::state_manager::StateManager;
use crate::core::workflow::{ApprovalRequest, ApprovalStatus, RequestType};

const NOT_FOUND: &str = "Approval request not found";

/// Tests submitted for review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSubmission {
    pub workflow_id: String,
    pub feature_description: String,
    pub generated_tests: String,
    pub test_categories: Vec<String>,
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
}

/// Human decision on a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default = "default_reviewer")]
    pub reviewer: String,
    #[serde(default = "now_rfc3339")]
    pub reviewed_at: String,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

fn default_reviewer() -> String {
    "human".to_string()
}

/// In-memory record of a submission awaiting or holding a decision
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub id: String,
    pub request: ApprovalSubmission,
    /// "pending" until a decision arrives, then "reviewed"
    pub status: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ApprovalDecision>,
}

/// Shared server state
#[derive(Clone)]
pub struct ApprovalState {
    approvals: Arc<RwLock<HashMap<String, PendingApproval>>>,
    base_url: String,
    ttl: Duration,
    state_manager: Option<Arc<StateManager>>,
}

impl ApprovalState {
    pub fn new(base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            approvals: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl,
            state_manager: None,
        }
    }

    /// Mirror approvals into persistent state
    pub fn with_state_manager(mut self, manager: Arc<StateManager>) -> Self {
        self.state_manager = Some(manager);
        self
    }

    pub fn approval_url(&self, id: &str) -> String {
        format!("{}/approve/{}", self.base_url, id)
    }

    async fn create(&self, request: ApprovalSubmission) -> String {
        let id = ulid::Ulid::new().to_string();
        let now = Utc::now();

        if let Some(manager) = &self.state_manager {
            let record = ApprovalRequest {
                approval_id: id.clone(),
                workflow_id: request.workflow_id.clone(),
                request_type: RequestType::Test,
                content: request.generated_tests.clone(),
                requester: "approval-server".to_string(),
                created_at: now,
                expires_at: now
                    + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1)),
                status: ApprovalStatus::Pending,
                decided_at: None,
                notes: None,
            };
            if !manager.save_approval_request(&record).await {
                warn!("Approval {} not persisted", id);
            }
        }

        let pending = PendingApproval {
            id: id.clone(),
            request,
            status: "pending".to_string(),
            created_at: now.to_rfc3339(),
            response: None,
        };
        self.approvals.write().await.insert(id.clone(), pending);
        info!("Created approval request {}", id);
        id
    }
}

/// Build the approval router
pub fn router(state: ApprovalState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhook/approval-request", post(create_approval_request))
        .route("/approve/{id}", get(show_approval_page))
        .route(
            "/webhook/approval-response/{id}",
            post(submit_approval_response),
        )
        .route("/webhook/check-approval/{id}", get(check_approval_status))
        .route("/webhook/approve-tests", post(approve_tests))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({"status": "running", "service": "AI Rails TDD Approval Server"}))
}

async fn create_approval_request(
    State(state): State<ApprovalState>,
    payload: Result<Json<ApprovalSubmission>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let id = state.create(request).await;
    Ok(Json(json!({
        "approval_id": id,
        "approval_url": state.approval_url(&id),
        "message": "Approval request created. Visit the URL to review and approve/reject.",
    })))
}

async fn show_approval_page(
    State(state): State<ApprovalState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let approvals = state.approvals.read().await;
    let approval = approvals.get(&id).ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    Ok(Html(render_approval_page(approval)))
}

async fn submit_approval_response(
    State(state): State<ApprovalState>,
    Path(id): Path<String>,
    payload: Result<Json<ApprovalDecision>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(decision) = payload?;
    let feedback = decision.feedback.as_deref().unwrap_or("").trim().to_string();
    if !decision.approved && feedback.is_empty() {
        return Err(AppError::bad_request(
            "Feedback is required when rejecting tests",
        ));
    }

    {
        let mut approvals = state.approvals.write().await;
        let approval = approvals
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(NOT_FOUND))?;
        approval.status = "reviewed".to_string();
        approval.response = Some(decision.clone());
    }

    info!(
        "Approval {} {}",
        id,
        if decision.approved { "approved" } else { "rejected" }
    );

    if let Some(manager) = &state.state_manager {
        if !manager
            .update_approval_status(&id, decision.approved, &feedback)
            .await
        {
            warn!("Decision for {} not persisted", id);
        }
    }

    Ok(Json(json!({"status": "success", "message": "Approval response recorded"})))
}

async fn check_approval_status(
    State(state): State<ApprovalState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let approvals = state.approvals.read().await;
    let approval = approvals.get(&id).ok_or_else(|| AppError::not_found(NOT_FOUND))?;
    Ok(Json(json!({
        "approval_id": id,
        "status": approval.status,
        "response": approval.response,
    })))
}

/// Loose variant for webhook nodes that cannot shape the payload
async fn approve_tests(
    State(state): State<ApprovalState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(data) = payload?;
    let text = |key: &str, default: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    let test_categories = data
        .get("test_categories")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let request = ApprovalSubmission {
        workflow_id: text("workflow_id", "unknown"),
        feature_description: text("feature_description", ""),
        generated_tests: text("generated_tests", ""),
        test_categories,
        timestamp: now_rfc3339(),
    };

    let id = state.create(request).await;
    Ok(Json(json!({
        "approval_url": state.approval_url(&id),
        "approval_id": id,
        "message": "Visit the approval URL to review tests",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app_state() -> ApprovalState {
        ApprovalState::new("http://localhost:8000/", Duration::from_secs(3600))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn submission() -> Value {
        json!({
            "workflow_id": "wf-1",
            "feature_description": "Email <validator>",
            "generated_tests": "def test_x():\n    assert 1 < 2",
            "test_categories": ["unit", "edge"]
        })
    }

    #[tokio::test]
    async fn test_root_status() {
        let app = router(app_state());
        let (status, body) = send_json(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "AI Rails TDD Approval Server");
    }

    #[tokio::test]
    async fn test_full_approval_flow() {
        let app = router(app_state());

        let (status, created) =
            send_json(&app, "POST", "/webhook/approval-request", Some(submission())).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["approval_id"].as_str().unwrap().to_string();
        assert_eq!(
            created["approval_url"],
            format!("http://localhost:8000/approve/{}", id)
        );

        let (status, page) = send(&app, "GET", &format!("/approve/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(page).unwrap();
        assert!(page.contains("Email &lt;validator&gt;"));
        assert!(page.contains("assert 1 &lt; 2"));
        assert!(page.contains(r#"<span class="category">edge</span>"#));
        assert!(page.contains("No obvious test gaming opportunities"));

        let (_, pending) =
            send_json(&app, "GET", &format!("/webhook/check-approval/{}", id), None).await;
        assert_eq!(pending["status"], "pending");
        assert!(pending["response"].is_null());

        let (status, recorded) = send_json(
            &app,
            "POST",
            &format!("/webhook/approval-response/{}", id),
            Some(json!({"approved": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(recorded["status"], "success");

        let (_, reviewed) =
            send_json(&app, "GET", &format!("/webhook/check-approval/{}", id), None).await;
        assert_eq!(reviewed["status"], "reviewed");
        assert_eq!(reviewed["response"]["approved"], true);
        assert_eq!(reviewed["response"]["reviewer"], "human");
    }

    #[tokio::test]
    async fn test_rejection_requires_feedback() {
        let app = router(app_state());
        let (_, created) =
            send_json(&app, "POST", "/webhook/approval-request", Some(submission())).await;
        let id = created["approval_id"].as_str().unwrap();

        let (status, body) = send_json(
            &app,
            "POST",
            &format!("/webhook/approval-response/{}", id),
            Some(json!({"approved": false, "feedback": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Feedback"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_404() {
        let app = router(app_state());
        let (status, body) = send_json(&app, "GET", "/webhook/check-approval/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], NOT_FOUND);

        let (status, _) = send(&app, "GET", "/approve/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/webhook/approval-response/nope",
            Some(json!({"approved": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_bodies_get_json_errors() {
        let app = router(app_state());
        let (_, created) =
            send_json(&app, "POST", "/webhook/approval-request", Some(submission())).await;
        let id = created["approval_id"].as_str().unwrap();

        let (status, body) = send_json(
            &app,
            "POST",
            &format!("/webhook/approval-response/{}", id),
            Some(json!({"feedback": "no decision"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("approved"));

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/approve-tests")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_approve_tests_fills_defaults() {
        let app = router(app_state());
        let (status, body) =
            send_json(&app, "POST", "/webhook/approve-tests", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Visit the approval URL to review tests");

        let id = body["approval_id"].as_str().unwrap();
        let (status, _) = send(&app, "GET", &format!("/approve/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_decisions_mirrored_to_state_manager() {
        let manager = Arc::new(StateManager::in_memory());
        let app = router(app_state().with_state_manager(manager.clone()));

        let (_, created) =
            send_json(&app, "POST", "/webhook/approval-request", Some(submission())).await;
        let id = created["approval_id"].as_str().unwrap().to_string();

        let stored = manager.get_approval_request(&id).await.unwrap();
        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert_eq!(stored.workflow_id, "wf-1");

        send_json(
            &app,
            "POST",
            &format!("/webhook/approval-response/{}", id),
            Some(json!({"approved": false, "feedback": "needs edge cases"})),
        )
        .await;

        let decided = manager.get_approval_request(&id).await.unwrap();
        assert_eq!(decided.status, ApprovalStatus::Rejected);
        assert_eq!(decided.notes.as_deref(), Some("needs edge cases"));
    }
}
