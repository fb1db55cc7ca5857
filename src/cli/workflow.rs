//! `ai-rails workflow` command
//!
//! Runs the three TDD steps back to back: tests from the planning doc, code
//! from the tests, then a review of the code against the tests.
//!
//! # Usage
//! ```bash
//! ai-rails workflow --planning-doc planning.md --output-dir output
//! ai-rails workflow --planning-doc planning.md --track --index
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::utils::{embedding_manager, openrouter_client, read_input, state_manager, vector_manager};
use crate::config::Config;
use crate::core::access::AccessControl;
use crate::core::search::{Artifact, ArtifactIndex, ArtifactKind};
use crate::core::state_manager::StateManager;
use crate::core::workflow::{WorkflowState, WorkflowStatus};
use crate::remote::models::{DEFAULT_CODE_MODEL, DEFAULT_REVIEW_MODEL, DEFAULT_TEST_MODEL};

pub const TESTS_FILE: &str = "generated_tests.py";
pub const CODE_FILE: &str = "generated_code.py";
pub const REVIEW_FILE: &str = "code_review.md";

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// Planning document content or file path
    #[arg(long)]
    pub planning_doc: String,

    #[arg(long, default_value = DEFAULT_TEST_MODEL)]
    pub test_model: String,

    #[arg(long, default_value = DEFAULT_CODE_MODEL)]
    pub code_model: String,

    #[arg(long, default_value = DEFAULT_REVIEW_MODEL)]
    pub review_model: String,

    /// Write tests, code and review into this directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Persist workflow state after each stage
    #[arg(long)]
    pub track: bool,

    /// Workflow ID (generated when omitted)
    #[arg(long)]
    pub workflow_id: Option<String>,

    /// Index the artifacts for semantic search
    #[arg(long)]
    pub index: bool,
}

struct Tracker {
    manager: StateManager,
    workflow_id: String,
}

impl Tracker {
    async fn start(config: &Config, workflow_id: String, description: &str) -> Result<Self> {
        let manager = state_manager(config).await?;
        if manager.is_using_memory() {
            warn!("Workflow state is kept in memory and will not outlive this run");
        }
        let mut state = WorkflowState::new(&workflow_id, description, "test_generation");
        state.status = WorkflowStatus::InProgress;
        if !manager.save_workflow_state(&state).await {
            anyhow::bail!("Failed to save workflow state for {}", workflow_id);
        }
        println!("📌 Tracking workflow {}", workflow_id);
        Ok(Self {
            manager,
            workflow_id,
        })
    }

    async fn stage(&self, stage: &str, status: WorkflowStatus, extra: Map<String, Value>) {
        let mut updates = Map::new();
        updates.insert("current_stage".into(), json!(stage));
        updates.insert("status".into(), json!(status));
        if !extra.is_empty() {
            updates.insert("metadata".into(), Value::Object(extra));
        }
        if !self.manager.update_workflow_state(&self.workflow_id, updates).await {
            warn!("Could not record stage {} for {}", stage, self.workflow_id);
        }
    }
}

pub async fn run(args: WorkflowArgs, config: &Config) -> Result<()> {
    let client = openrouter_client(config)?;
    let planning_doc = read_input(&args.planning_doc)?;
    let workflow_id = args
        .workflow_id
        .clone()
        .unwrap_or_else(|| format!("wf-{}", ulid::Ulid::new().to_string().to_lowercase()));

    let tracker = if args.track {
        Some(Tracker::start(config, workflow_id.clone(), &summary_line(&planning_doc)).await?)
    } else {
        None
    };

    println!("🚀 Starting AI Rails TDD Workflow with OpenRouter");
    println!("{}", "=".repeat(60));

    let result = run_stages(&args, &client, &planning_doc, tracker.as_ref()).await;
    let (tests, code, review) = match result {
        Ok(outputs) => outputs,
        Err(e) => {
            if let Some(t) = &tracker {
                let mut meta = Map::new();
                meta.insert("error".into(), json!(format!("{:#}", e)));
                t.stage("failed", WorkflowStatus::Failed, meta).await;
            }
            return Err(e.context("Error in workflow"));
        }
    };

    println!("\n{}", "=".repeat(60));
    println!("📋 Results:");
    println!("{}", "=".repeat(60));

    let mut written = Map::new();
    match &args.output_dir {
        Some(dir) => {
            for (name, path) in write_outputs(dir, &tests, &code, &review)? {
                println!("📄 {} saved to: {}", name, path.display());
                written.insert(name.to_lowercase(), json!(path.display().to_string()));
            }
        }
        None => {
            for (title, body) in [
                ("🧪 Generated Tests:", &tests),
                ("💻 Generated Code:", &code),
                ("🔍 Code Review:", &review),
            ] {
                println!("\n{}", title);
                println!("{}", "-".repeat(30));
                println!("{}", body);
            }
        }
    }

    if args.index && !config.vector.enabled {
        warn!("Vector search is disabled, artifacts not indexed");
    } else if args.index {
        let vectors = vector_manager(config)?;
        let embeddings = embedding_manager(config);
        let index = ArtifactIndex::new(&vectors, &embeddings);
        let artifacts = [
            Artifact { workflow_id: &workflow_id, kind: ArtifactKind::Plan, content: &planning_doc },
            Artifact { workflow_id: &workflow_id, kind: ArtifactKind::Tests, content: &tests },
            Artifact { workflow_id: &workflow_id, kind: ArtifactKind::Code, content: &code },
            Artifact { workflow_id: &workflow_id, kind: ArtifactKind::Review, content: &review },
        ];
        let ids = index.index_all(&artifacts).await;
        println!("🔎 Indexed {} artifact(s) ({})", ids.len(), vectors.mode());
    }

    if let Some(t) = &tracker {
        t.stage("completed", WorkflowStatus::Completed, written).await;
    }

    println!("\n🎉 Workflow completed successfully!");
    Ok(())
}

async fn run_stages(
    args: &WorkflowArgs,
    client: &crate::remote::OpenRouterClient,
    planning_doc: &str,
    tracker: Option<&Tracker>,
) -> Result<(String, String, String)> {
    println!("🧪 Step 1: Generating tests with {}...", args.test_model);
    let tests = client.generate_tests(planning_doc, &args.test_model).await?;
    println!("✅ Tests generated!");
    if let Some(t) = tracker {
        t.stage("code_generation", WorkflowStatus::InProgress, Map::new()).await;
    }

    println!("💻 Step 2: Generating code with {}...", args.code_model);
    let code = client.generate_code(&tests, planning_doc, &args.code_model).await?;
    println!("✅ Code generated!");
    if let Some(t) = tracker {
        t.stage("code_review", WorkflowStatus::InProgress, Map::new()).await;
    }

    println!("🔍 Step 3: Reviewing code with {}...", args.review_model);
    let review = client.review_code(&tests, &code, &args.review_model).await?;
    println!("✅ Code review completed!");

    Ok((tests, code, review))
}

/// Write the three artifacts; returns (label, path) per file
pub fn write_outputs(
    dir: &Path,
    tests: &str,
    code: &str,
    review: &str,
) -> Result<Vec<(&'static str, PathBuf)>> {
    let access = AccessControl::from_cwd()?;
    access.validate_access(dir, crate::core::access::Operation::Write)?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let review_doc = format!("# Code Review\n\n{}", review);
    let mut written = Vec::new();
    for (label, name, content) in [
        ("Tests", TESTS_FILE, tests),
        ("Code", CODE_FILE, code),
        ("Review", REVIEW_FILE, review_doc.as_str()),
    ] {
        let path = dir.join(name);
        access.safe_write(&path, content)?;
        written.push((label, path));
    }
    Ok(written)
}

/// First non-empty line, used as the tracked feature description
fn summary_line(planning_doc: &str) -> String {
    planning_doc
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .chars()
        .take(200)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let written = write_outputs(&out, "def test_a(): pass", "def a(): pass", "LGTM").unwrap();

        assert_eq!(written.len(), 3);
        assert_eq!(
            std::fs::read_to_string(out.join(TESTS_FILE)).unwrap(),
            "def test_a(): pass"
        );
        assert_eq!(
            std::fs::read_to_string(out.join(REVIEW_FILE)).unwrap(),
            "# Code Review\n\nLGTM"
        );
    }

    #[test]
    fn test_write_outputs_refuses_restricted_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("agent-sandbox");
        assert!(write_outputs(&out, "t", "c", "r").is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(summary_line("\n# Email validator\n\nDetails"), "Email validator");
        assert_eq!(summary_line(""), "");
    }

    #[tokio::test]
    async fn test_tracker_records_stages() {
        let tracker = Tracker {
            manager: StateManager::in_memory(),
            workflow_id: "wf-t".to_string(),
        };
        let state = WorkflowState::new("wf-t", "demo", "test_generation");
        assert!(tracker.manager.save_workflow_state(&state).await);

        let mut meta = Map::new();
        meta.insert("tests".into(), json!("out/generated_tests.py"));
        tracker.stage("completed", WorkflowStatus::Completed, meta).await;

        let saved = tracker.manager.get_workflow_state("wf-t").await.unwrap();
        assert_eq!(saved.current_stage, "completed");
        assert_eq!(saved.status, WorkflowStatus::Completed);
        assert_eq!(saved.metadata["tests"], json!("out/generated_tests.py"));
    }
}
