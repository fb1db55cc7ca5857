//! Remote service clients
//!
//! HTTP clients for OpenRouter (chat completions), Upstash Vector and the
//! OpenAI embeddings API, plus the model catalogue and system prompts.

pub mod models;
mod openai;
mod openrouter;
pub mod prompts;
mod types;
mod upstash;

pub use openai::EmbeddingsClient;
pub use openrouter::OpenRouterClient;
pub use types::*;
pub use upstash::UpstashClient;

use anyhow::{Context, Result};

use crate::error::RailsError;

/// Decode a JSON body, turning non-2xx statuses into `RailsError::Api`
pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T> {
    let status = resp.status();

    if !status.is_success() {
        let body = extract_error(resp).await;
        return Err(RailsError::Api {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    resp.json().await.context("Failed to parse response")
}

/// Best-effort error message from a failed response
pub(crate) async fn extract_error(resp: reqwest::Response) -> String {
    let text = match resp.text().await {
        Ok(text) => text,
        Err(_) => return "Unknown error".to_string(),
    };
    if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(&text) {
        return err.error.message().to_string();
    }
    if text.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        text
    }
}
