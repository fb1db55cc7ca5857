//! Error types
//!
//! Most call sites use `anyhow::Result`; these enums cover the failures that
//! callers need to match on.

use thiserror::Error;

/// Schema validation failure for a persisted record
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("ttl_hours must be between 1 and 720, got {0}")]
    TtlOutOfRange(u32),

    #[error("last_updated cannot be before created_at")]
    UpdatedBeforeCreated,

    #[error("expires_at must be after created_at")]
    ExpiresBeforeCreated,

    #[error("duration_seconds must be >= 0, got {0}")]
    NegativeDuration(f64),

    #[error("coverage_percent must be between 0 and 100, got {0}")]
    CoverageOutOfRange(f64),

    #[error("invalid record: {0}")]
    Malformed(String),
}

/// Failures surfaced by the service clients and the test runner
#[derive(Debug, Error)]
pub enum RailsError {
    #[error("{0} environment variable is required")]
    MissingApiKey(&'static str),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("response did not contain any completion choices")]
    EmptyCompletion,

    #[error("Language '{0}' not supported yet. Only Python is currently supported.")]
    UnsupportedLanguage(String),

    #[error("Test framework '{0}' not supported. Only pytest is currently supported.")]
    UnsupportedFramework(String),

    #[error("timeout must be between 1 and {max} seconds, got {got}")]
    TimeoutOutOfRange { got: u64, max: u64 },

    #[error("Access denied: {0} is in a restricted directory for blind testing. Please paste the content directly into the conversation.")]
    AccessDenied(String),
}
