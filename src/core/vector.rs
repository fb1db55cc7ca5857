//! Vector storage with memory fallback
//!
//! Uses Upstash Vector when credentials are configured. Any remote failure
//! falls through to an in-process map searched by brute-force cosine
//! similarity, so callers always get an answer.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::remote::{UpstashClient, VectorMatch, VectorRecord};

type MemoryEntry = (Vec<f32>, Map<String, Value>);

pub struct VectorManager {
    remote: Option<UpstashClient>,
    memory: Mutex<BTreeMap<String, MemoryEntry>>,
}

impl VectorManager {
    pub fn new(remote: Option<UpstashClient>) -> Self {
        match &remote {
            Some(_) => info!("Using Upstash Vector"),
            None => warn!("Upstash Vector credentials not found. Vector search running in memory-only mode."),
        }
        Self {
            remote,
            memory: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            remote: None,
            memory: Mutex::new(BTreeMap::new()),
        }
    }

    /// "upstash" or "memory"
    pub fn mode(&self) -> &'static str {
        if self.remote.is_some() {
            "upstash"
        } else {
            "memory"
        }
    }

    /// Insert or update a vector; stamps `timestamp` metadata when absent
    pub async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Option<Map<String, Value>>) -> bool {
        let mut metadata = metadata.unwrap_or_default();
        metadata
            .entry("timestamp")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        if let Some(remote) = &self.remote {
            let record = VectorRecord {
                id: id.to_string(),
                vector,
                metadata,
            };
            match remote.upsert(std::slice::from_ref(&record)).await {
                Ok(()) => return true,
                Err(e) => {
                    error!("Failed to upsert vector to Upstash: {:#}", e);
                    self.memory
                        .lock()
                        .await
                        .insert(record.id, (record.vector, record.metadata));
                    return true;
                }
            }
        }

        self.memory
            .lock()
            .await
            .insert(id.to_string(), (vector, metadata));
        true
    }

    /// Most similar vectors, best first
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&str>,
        include_vectors: bool,
    ) -> Vec<VectorMatch> {
        if let Some(remote) = &self.remote {
            match remote.query(vector, top_k, filter, include_vectors).await {
                Ok(matches) => return matches,
                Err(e) => error!("Failed to query vectors from Upstash: {:#}", e),
            }
        }

        let memory = self.memory.lock().await;
        let mut scored: Vec<VectorMatch> = memory
            .iter()
            .filter(|(_, (_, metadata))| filter.map_or(true, |f| matches_filter(metadata, f)))
            .map(|(id, (stored, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, stored),
                metadata: metadata.clone(),
                vector: include_vectors.then(|| stored.clone()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    /// Delete vectors; `false` reports a remote failure, memory is cleared regardless
    pub async fn delete(&self, ids: &[String]) -> bool {
        let mut success = true;

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(ids).await {
                error!("Failed to delete vectors from Upstash: {:#}", e);
                success = false;
            }
        }

        let mut memory = self.memory.lock().await;
        for id in ids {
            memory.remove(id);
        }
        success
    }

    /// Fetch vectors by ID
    pub async fn fetch(&self, ids: &[String]) -> Vec<VectorRecord> {
        if let Some(remote) = &self.remote {
            match remote.fetch(ids).await {
                Ok(records) => return records,
                Err(e) => error!("Failed to fetch vectors from Upstash: {:#}", e),
            }
        }

        let memory = self.memory.lock().await;
        ids.iter()
            .filter_map(|id| {
                memory.get(id).map(|(vector, metadata)| VectorRecord {
                    id: id.clone(),
                    vector: vector.clone(),
                    metadata: metadata.clone(),
                })
            })
            .collect()
    }

    /// Merge `metadata` into an existing vector's metadata
    pub async fn update_metadata(&self, id: &str, metadata: Map<String, Value>) -> bool {
        let Some(current) = self.fetch(&[id.to_string()]).await.into_iter().next() else {
            return false;
        };

        let mut merged = current.metadata;
        merged.extend(metadata);
        self.upsert(id, current.vector, Some(merged)).await
    }
}

/// Cosine similarity; 0 on length mismatch or zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Memory-mode filter: only `key = 'value'` is understood, anything else matches
pub fn matches_filter(metadata: &Map<String, Value>, filter: &str) -> bool {
    let parts: Vec<&str> = filter.split('=').collect();
    if parts.len() != 2 {
        return true;
    }

    let key = parts[0].trim();
    let value = parts[1].trim().trim_matches(|c| c == '\'' || c == '"');

    metadata.get(key).and_then(Value::as_str) == Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(kind: &str) -> Option<Map<String, Value>> {
        let mut m = Map::new();
        m.insert("type".into(), json!(kind));
        Some(m)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_filter_matching() {
        let m = meta("plan").unwrap();
        assert!(matches_filter(&m, "type = 'plan'"));
        assert!(matches_filter(&m, "type=\"plan\""));
        assert!(!matches_filter(&m, "type = 'code'"));
        assert!(!matches_filter(&m, "workflow_id = 'x'"));
        // Unsupported shapes match everything
        assert!(matches_filter(&m, "type = 'a' AND x = 'b' = c"));
        assert!(matches_filter(&m, "score > 3"));
    }

    #[tokio::test]
    async fn test_memory_query_ranks_and_truncates() {
        let vm = VectorManager::in_memory();
        assert_eq!(vm.mode(), "memory");
        vm.upsert("a", vec![1.0, 0.0], meta("plan")).await;
        vm.upsert("b", vec![0.7, 0.7], meta("code")).await;
        vm.upsert("c", vec![0.0, 1.0], meta("plan")).await;

        let results = vm.query(&[1.0, 0.1], 2, None, false).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
        assert!(results[0].vector.is_none());

        let plans = vm.query(&[0.0, 1.0], 5, Some("type = 'plan'"), true).await;
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].id, "c");
        assert_eq!(plans[0].vector.as_deref(), Some(&[0.0, 1.0][..]));
    }

    #[tokio::test]
    async fn test_upsert_stamps_timestamp_once() {
        let vm = VectorManager::in_memory();
        let mut m = Map::new();
        m.insert("timestamp".into(), json!("2024-01-01T00:00:00Z"));
        vm.upsert("x", vec![1.0], Some(m)).await;
        vm.upsert("y", vec![1.0], None).await;

        let records = vm.fetch(&["x".into(), "y".into(), "missing".into()]).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata["timestamp"], "2024-01-01T00:00:00Z");
        assert!(records[1].metadata["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_update_metadata_merges() {
        let vm = VectorManager::in_memory();
        vm.upsert("a", vec![1.0, 2.0], meta("plan")).await;

        let mut extra = Map::new();
        extra.insert("reviewed".into(), json!(true));
        assert!(vm.update_metadata("a", extra).await);
        assert!(!vm.update_metadata("missing", Map::new()).await);

        let record = &vm.fetch(&["a".into()]).await[0];
        assert_eq!(record.metadata["type"], "plan");
        assert_eq!(record.metadata["reviewed"], true);
        assert_eq!(record.vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_delete_clears_memory() {
        let vm = VectorManager::in_memory();
        vm.upsert("a", vec![1.0], None).await;
        assert!(vm.delete(&["a".into(), "b".into()]).await);
        assert!(vm.fetch(&["a".into()]).await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_memory() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let remote = UpstashClient::new(&server.url(), "t".into(), 5).unwrap();
        let vm = VectorManager::new(Some(remote));
        assert_eq!(vm.mode(), "upstash");

        assert!(vm.upsert("a", vec![1.0, 0.0], meta("plan")).await);
        let results = vm.query(&[1.0, 0.0], 3, None, false).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");

        assert!(!vm.delete(&["a".into()]).await);
        assert!(vm.fetch(&["a".into()]).await.is_empty());
    }
}
