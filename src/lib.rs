//! ai-rails - AI Rails TDD workflow automation
//!
//! Glue between an LLM aggregator, a key-value store, a vector index and two
//! small local HTTP services that together drive a test-first workflow.
//!
//! ## Key Concepts
//!
//! - **Workflow**: tests are generated from a planning doc, approved by a
//!   human, then code is generated against them and reviewed
//! - **State**: workflows, approvals and test results live in Redis with
//!   TTLs, or in memory when Redis is unreachable
//! - **Artifacts**: plans, tests, code and reviews are embedded and indexed
//!   for semantic search
//! - **Blind testing**: some directories are never read by the tool

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod remote;
pub mod server;

pub use config::Config;
pub use core::state_manager::StateManager;
pub use core::vector::VectorManager;
pub use error::{RailsError, ValidationError};
pub use remote::OpenRouterClient;
