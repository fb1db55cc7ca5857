//! OpenAI embeddings client

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use super::handle_response;
use super::types::*;

/// HTTP client for `POST /v1/embeddings`
#[derive(Debug, Clone)]
pub struct EmbeddingsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EmbeddingsClient {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Embed every input, returned in input order
    pub async fn embed(&self, model: &str, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model, input })
            .send()
            .await
            .context("Failed to reach embeddings API")?;

        let mut body: EmbeddingResponse = handle_response(resp).await?;
        if body.data.len() != input.len() {
            anyhow::bail!(
                "Embeddings API returned {} vectors for {} inputs",
                body.data.len(),
                input.len()
            );
        }
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_embed_orders_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer sk-real")
            .match_body(Matcher::Json(json!({
                "model": "text-embedding-3-small",
                "input": ["first", "second"]
            })))
            .with_status(200)
            .with_body(
                json!({"data": [
                    {"embedding": [0.2], "index": 1},
                    {"embedding": [0.1], "index": 0}
                ], "model": "text-embedding-3-small"})
                .to_string(),
            )
            .create_async()
            .await;

        let client = EmbeddingsClient::new(&server.url(), "sk-real".into(), 5).unwrap();
        let input = vec!["first".to_string(), "second".to_string()];
        let vectors = client.embed("text-embedding-3-small", &input).await.unwrap();

        assert_eq!(vectors, vec![vec![0.1], vec![0.2]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_count_mismatch_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let client = EmbeddingsClient::new(&server.url(), "k".into(), 5).unwrap();
        assert!(client.embed("m", &["x".to_string()]).await.is_err());
    }
}
