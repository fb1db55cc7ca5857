//! `ai-rails list-models` command
//!
//! # Usage
//! ```bash
//! ai-rails list-models
//! ai-rails list-models --provider anthropic
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{Table, Tabled};

use crate::remote::models::{
    AVAILABLE_MODELS, DEFAULT_CODE_MODEL, DEFAULT_REVIEW_MODEL, DEFAULT_TEST_MODEL,
};

#[derive(Args, Debug)]
pub struct ListModelsArgs {
    /// Only show models from this provider
    #[arg(short, long)]
    pub provider: Option<String>,
}

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Default for")]
    default_for: String,
}

fn default_role(model: &str) -> &'static str {
    match model {
        m if m == DEFAULT_TEST_MODEL => "tests",
        m if m == DEFAULT_CODE_MODEL => "code",
        m if m == DEFAULT_REVIEW_MODEL => "review",
        _ => "",
    }
}

pub fn run(args: ListModelsArgs) -> Result<()> {
    let rows: Vec<ModelRow> = AVAILABLE_MODELS
        .iter()
        .filter(|(provider, _)| {
            args.provider
                .as_deref()
                .map_or(true, |p| p.eq_ignore_ascii_case(provider))
        })
        .flat_map(|(provider, models)| {
            models.iter().map(move |model| ModelRow {
                provider: provider.to_uppercase(),
                model: model.to_string(),
                default_for: default_role(model).to_string(),
            })
        })
        .collect();

    if rows.is_empty() {
        println!("No models listed for that provider.");
        return Ok(());
    }

    println!("{}", "📚 Available Models by Provider".bold());
    println!("{}", Table::new(&rows));
    println!("\n{} model(s)", rows.len());
    Ok(())
}
