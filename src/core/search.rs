//! Artifact search
//!
//! Indexes the documents a workflow produces (plan, tests, code, review) as
//! embeddings and finds them again by free text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::embeddings::EmbeddingManager;
use super::vector::VectorManager;

const PREVIEW_CHARS: usize = 200;

/// Kind of workflow artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Plan,
    Tests,
    Code,
    Review,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Plan => write!(f, "plan"),
            ArtifactKind::Tests => write!(f, "tests"),
            ArtifactKind::Code => write!(f, "code"),
            ArtifactKind::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" | "planning" => Ok(ArtifactKind::Plan),
            "tests" | "test" => Ok(ArtifactKind::Tests),
            "code" | "implementation" => Ok(ArtifactKind::Code),
            "review" => Ok(ArtifactKind::Review),
            _ => anyhow::bail!("Unknown artifact type: {} (plan, tests, code, review)", s),
        }
    }
}

/// A document to index
#[derive(Debug, Clone)]
pub struct Artifact<'a> {
    pub workflow_id: &'a str,
    pub kind: ArtifactKind,
    pub content: &'a str,
}

impl Artifact<'_> {
    /// Vector ID: `{workflow_id}:{kind}`
    pub fn id(&self) -> String {
        format!("{}:{}", self.workflow_id, self.kind)
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("workflow_id".into(), json!(self.workflow_id));
        metadata.insert("type".into(), json!(self.kind.to_string()));
        metadata.insert("preview".into(), json!(preview(self.content)));
        metadata
    }
}

/// Search query builder
#[derive(Debug, Default)]
pub struct SearchQuery {
    /// Free-text query
    pub text: String,

    /// Only this artifact kind
    pub kind: Option<ArtifactKind>,

    /// Only artifacts of this workflow
    pub workflow_id: Option<String>,

    /// Maximum results
    pub limit: usize,

    /// Drop results scoring below this
    pub min_score: Option<f32>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 5,
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: ArtifactKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Upstash filter expression for the query
    pub fn filter(&self) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(kind) = self.kind {
            clauses.push(format!("type = '{}'", kind));
        }
        if let Some(id) = &self.workflow_id {
            clauses.push(format!("workflow_id = '{}'", id.replace('\'', "")));
        }
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    fn accepts(&self, metadata: &Map<String, Value>, score: f32) -> bool {
        if let Some(min) = self.min_score {
            if score < min {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if metadata.get("type").and_then(Value::as_str) != Some(kind.to_string().as_str()) {
                return false;
            }
        }
        if let Some(id) = &self.workflow_id {
            if metadata.get("workflow_id").and_then(Value::as_str) != Some(id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub workflow_id: Option<String>,
    pub kind: Option<String>,
    pub preview: Option<String>,
    pub score: f32,
}

/// Embedding-backed index over workflow artifacts
pub struct ArtifactIndex<'a> {
    vectors: &'a VectorManager,
    embeddings: &'a EmbeddingManager,
}

impl<'a> ArtifactIndex<'a> {
    pub fn new(vectors: &'a VectorManager, embeddings: &'a EmbeddingManager) -> Self {
        Self {
            vectors,
            embeddings,
        }
    }

    /// Embed and store one artifact, returning its vector ID
    pub async fn index(&self, artifact: &Artifact<'_>) -> Option<String> {
        if artifact.content.trim().is_empty() {
            return None;
        }
        let id = artifact.id();
        let vector = self.embeddings.create_embedding(artifact.content).await;
        debug!("Indexing artifact {}", id);
        self.vectors
            .upsert(&id, vector, Some(artifact.metadata()))
            .await
            .then_some(id)
    }

    /// Index every non-empty artifact in one embeddings batch
    pub async fn index_all(&self, artifacts: &[Artifact<'_>]) -> Vec<String> {
        let artifacts: Vec<&Artifact<'_>> = artifacts
            .iter()
            .filter(|a| !a.content.trim().is_empty())
            .collect();
        let texts: Vec<String> = artifacts.iter().map(|a| a.content.to_string()).collect();
        let vectors = self.embeddings.create_embeddings(&texts).await;

        let mut ids = Vec::with_capacity(artifacts.len());
        for (artifact, vector) in artifacts.into_iter().zip(vectors) {
            let id = artifact.id();
            if self.vectors.upsert(&id, vector, Some(artifact.metadata())).await {
                ids.push(id);
            }
        }
        ids
    }

    /// Execute a search query
    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        let vector = self.embeddings.create_embedding(&query.text).await;
        let filter = query.filter();
        let matches = self
            .vectors
            .query(&vector, query.limit, filter.as_deref(), false)
            .await;

        matches
            .into_iter()
            .filter(|m| query.accepts(&m.metadata, m.score))
            .map(|m| {
                let field = |k: &str| m.metadata.get(k).and_then(Value::as_str).map(str::to_string);
                SearchResult {
                    workflow_id: field("workflow_id"),
                    kind: field("type"),
                    preview: field("preview"),
                    id: m.id.clone(),
                    score: m.score,
                }
            })
            .collect()
    }
}

/// First characters of `content`, on a char boundary
pub fn preview(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression() {
        assert_eq!(SearchQuery::new("x").filter(), None);
        assert_eq!(
            SearchQuery::new("x").with_kind(ArtifactKind::Tests).filter().as_deref(),
            Some("type = 'tests'")
        );
        assert_eq!(
            SearchQuery::new("x")
                .with_kind(ArtifactKind::Code)
                .with_workflow("wf-1")
                .filter()
                .as_deref(),
            Some("type = 'code' AND workflow_id = 'wf-1'")
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview("  short  "), "short");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Tests".parse::<ArtifactKind>().unwrap(), ArtifactKind::Tests);
        assert_eq!("implementation".parse::<ArtifactKind>().unwrap(), ArtifactKind::Code);
        assert!("deploy".parse::<ArtifactKind>().is_err());
    }

    #[tokio::test]
    async fn test_index_and_search_in_memory() {
        let vectors = VectorManager::in_memory();
        let embeddings = EmbeddingManager::placeholder("text-embedding-3-small");
        let index = ArtifactIndex::new(&vectors, &embeddings);

        let ids = index
            .index_all(&[
                Artifact { workflow_id: "wf-1", kind: ArtifactKind::Plan, content: "Email validator plan" },
                Artifact { workflow_id: "wf-1", kind: ArtifactKind::Tests, content: "def test_email(): ..." },
                Artifact { workflow_id: "wf-2", kind: ArtifactKind::Tests, content: "def test_calc(): ..." },
                Artifact { workflow_id: "wf-2", kind: ArtifactKind::Review, content: "   " },
            ])
            .await;
        assert_eq!(ids, vec!["wf-1:plan", "wf-1:tests", "wf-2:tests"]);

        // Placeholder embeddings are deterministic, so the exact text is the best hit
        let hits = index.search(&SearchQuery::new("Email validator plan").with_limit(3)).await;
        assert_eq!(hits[0].id, "wf-1:plan");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].preview.as_deref(), Some("Email validator plan"));

        let tests_only = index
            .search(&SearchQuery::new("tests").with_kind(ArtifactKind::Tests).with_limit(10))
            .await;
        assert_eq!(tests_only.len(), 2);
        assert!(tests_only.iter().all(|h| h.kind.as_deref() == Some("tests")));

        let scoped = index
            .search(
                &SearchQuery::new("tests")
                    .with_kind(ArtifactKind::Tests)
                    .with_workflow("wf-2")
                    .with_limit(10),
            )
            .await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].workflow_id.as_deref(), Some("wf-2"));
    }

    #[tokio::test]
    async fn test_empty_artifact_not_indexed() {
        let vectors = VectorManager::in_memory();
        let embeddings = EmbeddingManager::placeholder("text-embedding-3-small");
        let index = ArtifactIndex::new(&vectors, &embeddings);
        let artifact = Artifact { workflow_id: "wf", kind: ArtifactKind::Code, content: "" };
        assert!(index.index(&artifact).await.is_none());
    }
}
