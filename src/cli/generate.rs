//! `ai-rails generate-tests`, `generate-code` and `review-code`
//!
//! Every text argument accepts either literal content or a path to a file.
//!
//! # Usage
//! ```bash
//! ai-rails generate-tests --planning-doc planning.md --output-file tests.py
//! ai-rails generate-code --tests tests.py --planning-doc planning.md
//! ai-rails review-code --tests tests.py --implementation code.py
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::utils::{openrouter_client, read_input};
use crate::config::Config;
use crate::core::access::AccessControl;
use crate::remote::models::{DEFAULT_CODE_MODEL, DEFAULT_REVIEW_MODEL, DEFAULT_TEST_MODEL};

#[derive(Args, Debug)]
pub struct GenerateTestsArgs {
    /// Planning document content or file path
    #[arg(long)]
    pub planning_doc: String,

    /// Model to use for test generation
    #[arg(long, default_value = DEFAULT_TEST_MODEL)]
    pub model: String,

    /// Output file for generated tests
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct GenerateCodeArgs {
    /// Test content or file path
    #[arg(long)]
    pub tests: String,

    /// Planning document content or file path
    #[arg(long)]
    pub planning_doc: String,

    /// Model to use for code generation
    #[arg(long, default_value = DEFAULT_CODE_MODEL)]
    pub model: String,

    /// Output file for generated code
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReviewCodeArgs {
    /// Test content or file path
    #[arg(long)]
    pub tests: String,

    /// Implementation content or file path
    #[arg(long)]
    pub implementation: String,

    /// Model to use for review
    #[arg(long, default_value = DEFAULT_REVIEW_MODEL)]
    pub model: String,
}

pub async fn run_generate_tests(args: GenerateTestsArgs, config: &Config) -> Result<()> {
    let client = openrouter_client(config)?;
    let planning_doc = read_input(&args.planning_doc)?;

    println!("🧪 Generating tests with {}...", args.model);
    let tests = client.generate_tests(&planning_doc, &args.model).await?;
    emit(&tests, args.output_file.as_ref(), "Generated Tests", "Tests")
}

pub async fn run_generate_code(args: GenerateCodeArgs, config: &Config) -> Result<()> {
    let client = openrouter_client(config)?;
    let tests = read_input(&args.tests)?;
    let planning_doc = read_input(&args.planning_doc)?;

    println!("💻 Generating code with {}...", args.model);
    let code = client.generate_code(&tests, &planning_doc, &args.model).await?;
    emit(&code, args.output_file.as_ref(), "Generated Code", "Code")
}

pub async fn run_review_code(args: ReviewCodeArgs, config: &Config) -> Result<()> {
    let client = openrouter_client(config)?;
    let tests = read_input(&args.tests)?;
    let implementation = read_input(&args.implementation)?;

    println!("🔍 Reviewing code with {}...", args.model);
    let review = client.review_code(&tests, &implementation, &args.model).await?;
    emit(&review, None, "Code Review", "Review")
}

fn emit(content: &str, output: Option<&PathBuf>, heading: &str, noun: &str) -> Result<()> {
    match output {
        Some(path) => {
            AccessControl::from_cwd()?.safe_write(path, content)?;
            println!("✅ {} saved to {}", noun, path.display());
        }
        None => {
            println!("\n{}:", heading);
            println!("{}", "=".repeat(50));
            println!("{}", content);
        }
    }
    Ok(())
}
