//! Model catalogue
//!
//! OpenRouter model identifiers grouped by provider.

pub const DEFAULT_TEST_MODEL: &str = "openai/gpt-4-turbo-preview";
pub const DEFAULT_CODE_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const DEFAULT_REVIEW_MODEL: &str = "perplexity/pplx-70b-online";

pub const AVAILABLE_MODELS: &[(&str, &[&str])] = &[
    (
        "openai",
        &[
            "openai/gpt-4-turbo-preview",
            "openai/gpt-4",
            "openai/gpt-3.5-turbo",
            "openai/gpt-4o",
            "openai/gpt-4o-mini",
        ],
    ),
    (
        "anthropic",
        &[
            "anthropic/claude-3.5-sonnet",
            "anthropic/claude-3-opus",
            "anthropic/claude-3-haiku",
            "anthropic/claude-3.5-haiku",
        ],
    ),
    (
        "perplexity",
        &[
            "perplexity/pplx-7b-online",
            "perplexity/pplx-70b-online",
            "perplexity/pplx-7b-chat",
            "perplexity/pplx-70b-chat",
            "perplexity/llama-3.1-8b-instruct",
            "perplexity/llama-3.1-70b-instruct",
        ],
    ),
    ("google", &["google/gemini-pro", "google/gemini-flash-1.5"]),
    (
        "meta",
        &[
            "meta-llama/llama-3.1-8b-instruct",
            "meta-llama/llama-3.1-70b-instruct",
        ],
    ),
];

/// Catalogue provider for a model ID, if listed
pub fn provider_of(model: &str) -> Option<&'static str> {
    AVAILABLE_MODELS
        .iter()
        .find(|(_, models)| models.contains(&model))
        .map(|(provider, _)| *provider)
}

pub fn is_listed(model: &str) -> bool {
    provider_of(model).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_listed() {
        assert_eq!(provider_of(DEFAULT_TEST_MODEL), Some("openai"));
        assert_eq!(provider_of(DEFAULT_CODE_MODEL), Some("anthropic"));
        assert_eq!(provider_of(DEFAULT_REVIEW_MODEL), Some("perplexity"));
    }

    #[test]
    fn test_meta_models_use_meta_llama_prefix() {
        assert_eq!(provider_of("meta-llama/llama-3.1-70b-instruct"), Some("meta"));
        assert!(!is_listed("meta/llama-3.1-70b-instruct"));
    }

    #[test]
    fn test_catalogue_size() {
        let total: usize = AVAILABLE_MODELS.iter().map(|(_, m)| m.len()).sum();
        assert_eq!(total, 19);
    }
}
