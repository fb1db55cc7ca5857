//! Helpers shared across CLI commands

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::core::access::AccessControl;
use crate::core::embeddings::EmbeddingManager;
use crate::core::state_manager::StateManager;
use crate::core::vector::VectorManager;
use crate::remote::prompts::{PromptLoader, SystemPrompts};
use crate::remote::{OpenRouterClient, UpstashClient};

/// Text given on the command line, or the content of the file it names
///
/// Files go through the access rules so restricted content must be pasted.
pub fn read_input(arg: &str) -> Result<String> {
    let path = Path::new(arg);
    if path.is_file() {
        return AccessControl::from_cwd()?.safe_read(path);
    }
    Ok(arg.to_string())
}

/// OpenRouter client with configured generation settings and prompt files
pub fn openrouter_client(config: &Config) -> Result<OpenRouterClient> {
    let mut loader = PromptLoader::new(config.prompts.resolve_dir());
    let prompts = SystemPrompts::resolve(&mut loader);
    Ok(OpenRouterClient::from_config(config)?.with_prompts(prompts))
}

/// Connected state manager (memory fallback per config)
pub async fn state_manager(config: &Config) -> Result<StateManager> {
    let mut manager = StateManager::new(config.redis.clone());
    manager.connect().await?;
    Ok(manager)
}

pub fn vector_manager(config: &Config) -> Result<VectorManager> {
    Ok(VectorManager::new(UpstashClient::from_config(&config.vector)?))
}

pub fn embedding_manager(config: &Config) -> EmbeddingManager {
    EmbeddingManager::from_config(&config.embeddings)
}

/// Parse `key=value` pairs into a JSON object; values that parse as JSON keep their type
pub fn parse_assignments(pairs: &[String]) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("Expected key=value, got '{}'", pair);
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

/// First `max` characters, with an ellipsis when cut
pub fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
