//! ai-rails CLI - Entry point
//!
//! Usage: ai-rails <command> [options]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ai_rails::cli::{Cli, Commands};
use ai_rails::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // The env hierarchy feeds both LOG_LEVEL and the config overrides
    let env_error = ai_rails::config::env::load_ai_rails_env().err();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(cli.verbose))
        .init();

    if let Some(e) = env_error {
        tracing::warn!("Failed to load env files: {:#}", e);
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::ListModels(args) => ai_rails::cli::models::run(args),
        Commands::GenerateTests(args) => ai_rails::cli::generate::run_generate_tests(args, &config).await,
        Commands::GenerateCode(args) => ai_rails::cli::generate::run_generate_code(args, &config).await,
        Commands::ReviewCode(args) => ai_rails::cli::generate::run_review_code(args, &config).await,
        Commands::Workflow(args) => ai_rails::cli::workflow::run(args, &config).await,
        Commands::State(args) => ai_rails::cli::state::execute(args, &config).await,
        Commands::Approvals(args) => ai_rails::cli::approvals::execute(args, &config).await,
        Commands::Vector(args) => ai_rails::cli::vector::execute(args, &config).await,
        Commands::RunTests(args) => ai_rails::cli::run_tests::run(args, &config).await,
        Commands::Serve(args) => ai_rails::cli::serve::run(args, &config).await,
        Commands::Env(args) => ai_rails::cli::env::execute(args),
        Commands::Prompts(args) => ai_rails::cli::prompts::execute(args, &config),
        Commands::Access(args) => ai_rails::cli::access::execute(args),
        Commands::Config(args) => ai_rails::cli::config::run(args),
    }
}

/// RUST_LOG wins, then LOG_LEVEL; `--verbose` forces debug
fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("ai_rails=debug,info");
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| ["trace", "debug", "info", "warn", "error"].contains(&l.as_str()))
        .unwrap_or_else(|| "warn".to_string());
    EnvFilter::new(level)
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(p) => Config::load_from(std::path::Path::new(p))?,
        None => Config::load_file()?,
    };
    config.apply_env();
    Ok(config)
}
