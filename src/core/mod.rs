//! Core module - Business logic
//!
//! Records, persistence, vector search, access rules and test execution.

pub mod access;
pub mod embeddings;
pub mod runner;
pub mod search;
pub mod state_manager;
pub mod store;
pub mod vector;
pub mod workflow;
