//! Text embeddings
//!
//! Calls the OpenAI embeddings API when a real key is configured. Without
//! one, or when the API fails, placeholder vectors are produced: they are
//! seeded from the text so the same input always yields the same vector.

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::config::EmbeddingsConfig;
use crate::remote::EmbeddingsClient;

const EMBEDDINGS_TIMEOUT_SECS: u64 = 30;

pub struct EmbeddingManager {
    model: String,
    dimension: usize,
    client: Option<EmbeddingsClient>,
}

impl EmbeddingManager {
    pub fn from_config(config: &EmbeddingsConfig) -> Self {
        let client = match config.api_key.as_deref() {
            Some(key) if !is_placeholder_key(key) => {
                match EmbeddingsClient::new(&config.base_url, key.to_string(), EMBEDDINGS_TIMEOUT_SECS) {
                    Ok(client) => {
                        info!("Using OpenAI embeddings with model {}", config.model);
                        Some(client)
                    }
                    Err(e) => {
                        error!("Failed to initialize embeddings client: {:#}", e);
                        None
                    }
                }
            }
            _ => {
                warn!("OpenAI API key not found or invalid. Using placeholder embeddings.");
                None
            }
        };
        Self::with_client(&config.model, client)
    }

    pub fn with_client(model: &str, client: Option<EmbeddingsClient>) -> Self {
        Self {
            model: model.to_string(),
            dimension: dimension_for(model),
            client,
        }
    }

    /// Placeholder-only manager
    pub fn placeholder(model: &str) -> Self {
        Self::with_client(model, None)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_placeholder(&self) -> bool {
        self.client.is_none()
    }

    pub async fn create_embedding(&self, text: &str) -> Vec<f32> {
        if let Some(client) = &self.client {
            match client.embed(&self.model, &[text.to_string()]).await {
                Ok(mut vectors) => {
                    if let Some(vector) = vectors.pop() {
                        return vector;
                    }
                }
                Err(e) => error!("OpenAI embedding error: {:#}", e),
            }
        }

        debug!("Using placeholder embeddings");
        placeholder_embedding(text, self.dimension)
    }

    /// Batch request, falling back to one request per text
    pub async fn create_embeddings(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if let Some(client) = &self.client {
            if !texts.is_empty() {
                match client.embed(&self.model, texts).await {
                    Ok(vectors) => return vectors,
                    Err(e) => error!("OpenAI batch embedding error: {:#}", e),
                }
            }
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.create_embedding(text).await);
        }
        vectors
    }
}

/// Unset-looking keys such as the template value `sk-...your-key-here...`
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    key.is_empty() || key.starts_with("sk-...")
}

pub fn dimension_for(model: &str) -> usize {
    if model == "text-embedding-3-large" {
        3072
    } else {
        1536
    }
}

/// Deterministic pseudo-random vector in `[0, 1)` seeded by `text`
pub fn placeholder_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    let mut state = u64::from_le_bytes(seed) | 1;

    (0..dimension)
        .map(|_| {
            // xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let bits = state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40;
            bits as f32 / (1u64 << 24) as f32
        })
        .collect()
}
