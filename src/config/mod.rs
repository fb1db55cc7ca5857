//! Configuration module
//!
//! Values come from three layers, later wins:
//! built-in defaults, `.ai-rails/config.toml` (local, else global), then
//! environment variables (themselves fed by the `.env` hierarchy in [`env`]).

pub mod env;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// OpenRouter API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_openrouter_url")]
    pub base_url: String,

    #[serde(default = "default_openrouter_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openrouter_url(),
            timeout_secs: default_openrouter_timeout(),
        }
    }
}

fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_openrouter_timeout() -> u64 {
    60
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Force TLS even when the URL says `redis://`
    #[serde(default)]
    pub tls: bool,

    #[serde(default = "default_true")]
    pub fallback_memory: bool,

    #[serde(default = "default_redis_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_redis_timeout")]
    pub op_timeout_secs: u64,

    #[serde(default)]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            tls: false,
            fallback_memory: true,
            connect_timeout_secs: default_redis_timeout(),
            op_timeout_secs: default_redis_timeout(),
            key_prefix: String::new(),
        }
    }
}

impl RedisConfig {
    /// URL to connect with, upgraded to `rediss://` when TLS is forced
    pub fn effective_url(&self) -> String {
        match self.url.strip_prefix("redis://") {
            Some(rest) if self.tls => format!("rediss://{}", rest),
            _ => self.url.clone(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Upstash Vector REST endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_url")]
    pub base_url: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key: None,
            base_url: default_openai_url(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_url() -> String {
    "https://api.openai.com".to_string()
}

/// Sampling parameters per generation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_test_temperature")]
    pub test_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub test_max_tokens: u32,

    #[serde(default = "default_code_temperature")]
    pub code_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub code_max_tokens: u32,

    #[serde(default = "default_code_temperature")]
    pub review_temperature: f32,

    #[serde(default = "default_review_max_tokens")]
    pub review_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            test_temperature: default_test_temperature(),
            test_max_tokens: default_max_tokens(),
            code_temperature: default_code_temperature(),
            code_max_tokens: default_max_tokens(),
            review_temperature: default_code_temperature(),
            review_max_tokens: default_review_max_tokens(),
        }
    }
}

fn default_test_temperature() -> f32 {
    0.7
}

fn default_code_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_review_max_tokens() -> u32 {
    1000
}

/// Local HTTP services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_approval_port")]
    pub approval_port: u16,

    #[serde(default = "default_runner_port")]
    pub runner_port: u16,

    /// Public base URL used to build approval links
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_approval_ttl")]
    pub approval_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            approval_port: default_approval_port(),
            runner_port: default_runner_port(),
            base_url: default_base_url(),
            approval_ttl_secs: default_approval_ttl(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_approval_port() -> u16 {
    8000
}

fn default_runner_port() -> u16 {
    8001
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_approval_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_runner_timeout(),
        }
    }
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_runner_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Directory holding `<name>.md` prompt overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl PromptsConfig {
    /// Resolve the prompts directory: config, then `$AI_RAILS_HOME/prompts`, then `./prompts`
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        if let Ok(home) = std::env::var("AI_RAILS_HOME") {
            return PathBuf::from(home).join("prompts");
        }
        PathBuf::from("prompts")
    }
}

impl Config {
    /// Load config from default locations, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env();
        Ok(config)
    }

    /// Load only the TOML layer
    pub fn load_file() -> Result<Self> {
        // Try local config first, then global
        if let Some(local) = Self::find_local_config() {
            return Self::load_from(&local);
        }

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                return Self::load_from(&global);
            }
        }

        Ok(Self::default())
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Find local .ai-rails/config.toml walking up directories
    pub fn find_local_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            let config_path = current.join(".ai-rails").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Global config path (~/.ai-rails/config.toml)
    pub fn global_config_path() -> Option<PathBuf> {
        global_dir().map(|d| d.join("config.toml"))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.openrouter.api_key = Some(v);
        }
        if let Some(v) = get("OPENROUTER_BASE_URL") {
            self.openrouter.base_url = v;
        }
        parse_into(get("OPENROUTER_TIMEOUT"), &mut self.openrouter.timeout_secs);

        if let Some(v) = get("UPSTASH_REDIS_URL").or_else(|| get("REDIS_URL")) {
            self.redis.url = v;
        }
        if let Some(v) = get("REDIS_TLS") {
            self.redis.tls = parse_bool(&v);
        }
        if let Some(v) = get("ENABLE_REDIS_FALLBACK") {
            self.redis.fallback_memory = parse_bool(&v);
        }
        if let Some(v) = get("REDIS_KEY_PREFIX") {
            self.redis.key_prefix = v;
        }

        if let Some(v) = get("UPSTASH_VECTOR_URL") {
            self.vector.url = Some(v);
        }
        if let Some(v) = get("UPSTASH_VECTOR_TOKEN") {
            self.vector.token = Some(v);
        }
        if let Some(v) = get("ENABLE_VECTOR_SEARCH") {
            self.vector.enabled = parse_bool(&v);
        }

        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.embeddings.api_key = Some(v);
        }

        parse_into(get("TEST_GENERATION_TEMPERATURE"), &mut self.generation.test_temperature);
        parse_into(get("CODE_GENERATION_TEMPERATURE"), &mut self.generation.code_temperature);
        parse_into(get("TEST_GENERATION_MAX_TOKENS"), &mut self.generation.test_max_tokens);
        parse_into(get("CODE_GENERATION_MAX_TOKENS"), &mut self.generation.code_max_tokens);

        parse_into(get("APPROVAL_SERVER_PORT"), &mut self.server.approval_port);
        parse_into(get("TEST_RUNNER_PORT"), &mut self.server.runner_port);
        if let Some(v) = get("WEBHOOK_BASE_URL") {
            self.server.base_url = v;
        }
        parse_into(get("APPROVAL_REQUEST_TTL"), &mut self.server.approval_ttl_secs);

        if let Some(v) = get("PYTHON") {
            self.runner.python = v;
        }
        parse_into(get("TEST_EXECUTION_TIMEOUT"), &mut self.runner.timeout_secs);
    }
}

/// ~/.ai-rails
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".ai-rails"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
    if let Some(v) = value {
        match v.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Ignoring unparseable config value: {}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert!(config.redis.fallback_memory);
        assert_eq!(config.generation.test_temperature, 0.7);
        assert_eq!(config.generation.review_max_tokens, 1000);
        assert_eq!(config.server.approval_port, 8000);
        assert_eq!(config.server.runner_port, 8001);
        assert_eq!(config.runner.timeout_secs, 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [redis]
            key_prefix = "ai_rails_"

            [generation]
            code_temperature = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(config.redis.key_prefix, "ai_rails_");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.generation.code_temperature, 0.1);
        assert_eq!(config.generation.code_max_tokens, 4000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_from(lookup(&[
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("REDIS_URL", "redis://cache:6379"),
            ("ENABLE_REDIS_FALLBACK", "false"),
            ("TEST_GENERATION_MAX_TOKENS", "6000"),
            ("APPROVAL_SERVER_PORT", "9000"),
            ("TEST_EXECUTION_TIMEOUT", "not-a-number"),
        ]));
        assert_eq!(config.openrouter.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(config.redis.url, "redis://cache:6379");
        assert!(!config.redis.fallback_memory);
        assert_eq!(config.generation.test_max_tokens, 6000);
        assert_eq!(config.server.approval_port, 9000);
        assert_eq!(config.runner.timeout_secs, 30);
    }

    #[test]
    fn test_upstash_url_wins_over_redis_url() {
        let mut config = Config::default();
        config.apply_env_from(lookup(&[
            ("UPSTASH_REDIS_URL", "rediss://:pw@x.upstash.io:6379"),
            ("REDIS_URL", "redis://local:6379"),
        ]));
        assert_eq!(config.redis.url, "rediss://:pw@x.upstash.io:6379");
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config::default();
        config.apply_env_from(lookup(&[("OPENROUTER_API_KEY", "  ")]));
        assert!(config.openrouter.api_key.is_none());
    }

    #[test]
    fn test_tls_upgrade() {
        let mut redis = RedisConfig::default();
        assert_eq!(redis.effective_url(), "redis://localhost:6379");
        redis.tls = true;
        assert_eq!(redis.effective_url(), "rediss://localhost:6379");
        redis.url = "rediss://already:6380".into();
        assert_eq!(redis.effective_url(), "rediss://already:6380");
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ai-rails").join("config.toml");
        let mut config = Config::default();
        config.runner.python = "/usr/bin/python3.12".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.runner.python, "/usr/bin/python3.12");
    }
}
