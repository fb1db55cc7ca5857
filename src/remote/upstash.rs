//! Upstash Vector REST client

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::handle_response;
use super::types::*;
use crate::config::VectorConfig;

/// HTTP client for an Upstash Vector index
#[derive(Debug, Clone)]
pub struct UpstashClient {
    client: Client,
    base_url: String,
    token: String,
}

impl UpstashClient {
    /// Create client from config; `None` when URL or token is missing or search is disabled
    pub fn from_config(config: &VectorConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        match (&config.url, &config.token) {
            (Some(url), Some(token)) => Ok(Some(Self::new(url, token.clone(), 30)?)),
            _ => Ok(None),
        }
    }

    pub fn new(base_url: &str, token: String, timeout_secs: u64) -> Result<Self> {
        url::Url::parse(base_url)
            .with_context(|| format!("Invalid vector URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Upstash request: POST {}", url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Upstash Vector ({})", endpoint))?;

        let wrapped: UpstashResponse<T> = handle_response(resp).await?;
        Ok(wrapped.result)
    }

    /// Insert or replace vectors
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let _: String = self.post("upsert", records).await?;
        Ok(())
    }

    /// Nearest neighbours of `vector`
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&str>,
        include_vectors: bool,
    ) -> Result<Vec<VectorMatch>> {
        let req = VectorQueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_vectors,
            filter,
        };
        self.post("query", &req).await
    }

    /// Delete vectors, returning how many existed
    pub async fn delete(&self, ids: &[String]) -> Result<u64> {
        let result: DeleteResult = self.post("delete", ids).await?;
        Ok(result.deleted)
    }

    /// Fetch vectors by ID; unknown IDs are skipped
    pub async fn fetch(&self, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let req = VectorFetchRequest {
            ids,
            include_metadata: true,
            include_vectors: true,
        };
        let found: Vec<Option<VectorRecord>> = self.post("fetch", &req).await?;
        Ok(found.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    async fn client(server: &mockito::ServerGuard) -> UpstashClient {
        UpstashClient::new(&server.url(), "tok".into(), 5).unwrap()
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = VectorConfig::default();
        assert!(UpstashClient::from_config(&config).unwrap().is_none());

        config.url = Some("https://v.upstash.io".into());
        config.token = Some("t".into());
        assert!(UpstashClient::from_config(&config).unwrap().is_some());

        config.enabled = false;
        assert!(UpstashClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_posts_records_with_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upsert")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!([
                {"id": "plan-1", "vector": [1.0, 0.0], "metadata": {"type": "plan"}}
            ])))
            .with_status(200)
            .with_body(r#"{"result": "Success"}"#)
            .create_async()
            .await;

        let mut metadata = serde_json::Map::new();
        metadata.insert("type".into(), json!("plan"));
        let record = VectorRecord {
            id: "plan-1".into(),
            vector: vec![1.0, 0.0],
            metadata,
        };
        client(&server).await.upsert(&[record]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_unwraps_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/query")
            .match_body(Matcher::PartialJson(json!({"topK": 2, "includeMetadata": true})))
            .with_status(200)
            .with_body(
                json!({"result": [
                    {"id": "a", "score": 0.9, "metadata": {"type": "plan"}},
                    {"id": "b", "score": 0.4}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let matches = client(&server).await.query(&[0.1, 0.2], 2, None, false).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[0].metadata["type"], "plan");
        assert!(matches[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_skips_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fetch")
            .with_status(200)
            .with_body(r#"{"result": [null, {"id": "b", "vector": [0.5], "metadata": {}}]}"#)
            .create_async()
            .await;

        let ids = vec!["a".to_string(), "b".to_string()];
        let records = client(&server).await.fetch(&ids).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector, vec![0.5]);
    }

    #[tokio::test]
    async fn test_error_status_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/delete")
            .with_status(401)
            .with_body(r#"{"error": "Unauthorized"}"#)
            .create_async()
            .await;

        let err = client(&server).await.delete(&["a".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Unauthorized"));
    }
}
