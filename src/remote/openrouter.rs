//! OpenRouter client
//!
//! Chat completions against any model OpenRouter aggregates, with the three
//! TDD steps (tests, implementation, review) layered on top.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info};

use super::handle_response;
use super::prompts::SystemPrompts;
use super::types::*;
use crate::config::{Config, GenerationConfig};
use crate::error::RailsError;

const REFERER: &str = "https://ai-rails-tdd.com";
const TITLE: &str = "AI Rails TDD";

/// HTTP client for the OpenRouter API
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    generation: GenerationConfig,
    prompts: SystemPrompts,
}

impl OpenRouterClient {
    /// Create client from config; the API key is required
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openrouter
            .api_key
            .clone()
            .ok_or(RailsError::MissingApiKey("OPENROUTER_API_KEY"))?;

        Ok(Self::new(
            &config.openrouter.base_url,
            api_key,
            config.openrouter.timeout_secs,
        )?
        .with_generation(config.generation.clone()))
    }

    /// Create client with explicit parameters
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            generation: GenerationConfig::default(),
            prompts: SystemPrompts::default(),
        })
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_prompts(mut self, prompts: SystemPrompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// POST /chat/completions
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = ChatCompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        debug!(model, temperature, ?max_tokens, "Sending chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&req)
            .send()
            .await
            .context("Failed to reach OpenRouter")?;

        let completion: ChatCompletionResponse = handle_response(resp).await?;
        if let Some(usage) = completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion usage"
            );
        }
        Ok(completion)
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let completion = self
            .chat_completion(model, messages, temperature, Some(max_tokens))
            .await?;
        completion
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| RailsError::EmptyCompletion.into())
    }

    /// Generate pytest tests from a planning document
    pub async fn generate_tests(&self, planning_doc: &str, model: &str) -> Result<String> {
        info!("Generating tests with {}", model);
        let messages = [
            Message::system(&self.prompts.test_generator),
            Message::user(format!(
                "Planning Document:\n{}\n\nGenerate comprehensive tests for this feature.",
                planning_doc
            )),
        ];
        self.complete(
            model,
            &messages,
            self.generation.test_temperature,
            self.generation.test_max_tokens,
        )
        .await
    }

    /// Generate an implementation that should pass `tests`
    pub async fn generate_code(&self, tests: &str, planning_doc: &str, model: &str) -> Result<String> {
        info!("Generating code with {}", model);
        let messages = [
            Message::system(&self.prompts.code_generator),
            Message::user(format!(
                "Tests to pass:\n{}\n\nPlanning Document:\n{}\n\nWrite the implementation.",
                tests, planning_doc
            )),
        ];
        self.complete(
            model,
            &messages,
            self.generation.code_temperature,
            self.generation.code_max_tokens,
        )
        .await
    }

    /// Short review of an implementation against its tests
    pub async fn review_code(&self, tests: &str, implementation: &str, model: &str) -> Result<String> {
        info!("Reviewing code with {}", model);
        let messages = [
            Message::system(&self.prompts.code_reviewer),
            Message::user(format!(
                "Review this implementation:\n\nTests:\n{}\n\nImplementation:\n{}\n\nProvide a brief code review focusing on quality and potential issues.",
                tests, implementation
            )),
        ];
        self.complete(
            model,
            &messages,
            self.generation.review_temperature,
            self.generation.review_max_tokens,
        )
        .await
    }
}
