//! CLI module - Command definitions and handlers

use clap::{Parser, Subcommand};

pub mod access;
pub mod approvals;
pub mod config;
pub mod env;
pub mod generate;
pub mod models;
pub mod prompts;
pub mod run_tests;
pub mod serve;
pub mod state;
pub mod utils;
pub mod vector;
pub mod workflow;

/// ai-rails - AI Rails TDD workflow automation
///
/// Generates tests, code and reviews through OpenRouter, tracks workflow
/// state, and runs the approval and test-runner services.
#[derive(Parser, Debug)]
#[command(name = "ai-rails")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (skips local/global lookup)
    #[arg(short, long, global = true, env = "AI_RAILS_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available models by provider
    ListModels(models::ListModelsArgs),

    /// Generate tests from a planning document
    GenerateTests(generate::GenerateTestsArgs),

    /// Generate implementation code from tests
    GenerateCode(generate::GenerateCodeArgs),

    /// Review code against its tests
    ReviewCode(generate::ReviewCodeArgs),

    /// Run the full TDD workflow
    Workflow(workflow::WorkflowArgs),

    /// Inspect workflow state
    State(state::StateArgs),

    /// Review approval requests
    Approvals(approvals::ApprovalsArgs),

    /// Semantic search over artifacts
    Vector(vector::VectorArgs),

    /// Run tests against an implementation with pytest
    RunTests(run_tests::RunTestsArgs),

    /// Start the approval server or the test runner
    Serve(serve::ServeArgs),

    /// Manage the .env file hierarchy
    Env(env::EnvArgs),

    /// Show system prompts
    Prompts(prompts::PromptsArgs),

    /// Check paths against blind-testing restrictions
    Access(access::AccessArgs),

    /// Get or set configuration
    Config(config::ConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_workflow() {
        let cli = Cli::parse_from([
            "ai-rails",
            "workflow",
            "--planning-doc",
            "plan.md",
            "--output-dir",
            "out",
            "--track",
        ]);
        match cli.command {
            Commands::Workflow(args) => {
                assert!(args.track);
                assert_eq!(args.test_model, "openai/gpt-4-turbo-preview");
                assert_eq!(args.output_dir.unwrap().to_str(), Some("out"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_runner() {
        let cli = Cli::parse_from(["ai-rails", "serve", "runner", "--port", "9001"]);
        match cli.command {
            Commands::Serve(args) => {
                assert!(matches!(args.service, serve::Service::Runner));
                assert_eq!(args.port, Some(9001));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
