//! `ai-rails prompts` command
//!
//! # Usage
//! ```bash
//! ai-rails prompts list
//! ai-rails prompts show test_generator
//! ai-rails prompts path
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::Config;
use crate::remote::prompts::{PromptKind, PromptLoader};

#[derive(Args, Debug)]
pub struct PromptsArgs {
    #[command(subcommand)]
    pub command: PromptsCommands,
}

#[derive(Subcommand, Debug)]
pub enum PromptsCommands {
    /// List prompt files
    List,

    /// Print a prompt (file if present, built-in otherwise)
    Show { name: String },

    /// Print the prompts directory
    Path,
}

const KINDS: [PromptKind; 3] = [
    PromptKind::TestGenerator,
    PromptKind::CodeGenerator,
    PromptKind::CodeReviewer,
];

pub fn execute(args: PromptsArgs, config: &Config) -> Result<()> {
    let mut loader = PromptLoader::new(config.prompts.resolve_dir());

    match args.command {
        PromptsCommands::Path => println!("{}", loader.dir().display()),
        PromptsCommands::List => {
            let files = loader.list();
            println!("📝 Prompts in {}", loader.dir().display());
            for kind in KINDS {
                let source = if files.iter().any(|f| f == kind.file_stem()) {
                    "file".green()
                } else {
                    "built-in".dimmed()
                };
                println!("  {:<16} {}", kind.file_stem(), source);
            }
            for extra in files
                .iter()
                .filter(|f| !KINDS.iter().any(|k| k.file_stem() == f.as_str()))
            {
                println!("  {:<16} {}", extra, "file".green());
            }
        }
        PromptsCommands::Show { name } => {
            let content = match loader.load(&name) {
                Ok(content) => content,
                Err(e) => match KINDS.iter().find(|k| k.file_stem() == name) {
                    Some(kind) => kind.builtin().to_string(),
                    None => return Err(e),
                },
            };
            println!("{}", content);
        }
    }
    Ok(())
}
