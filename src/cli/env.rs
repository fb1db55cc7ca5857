//! `ai-rails env` command
//!
//! # Usage
//! ```bash
//! ai-rails env init    # write templates, update .gitignore
//! ai-rails env show    # which env files exist and what they set
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::env::EnvManager;

#[derive(Args, Debug)]
pub struct EnvArgs {
    #[command(subcommand)]
    pub command: EnvCommands,
}

#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Create global and project env templates
    Init,

    /// Show the env file hierarchy
    Show {
        /// Also print merged keys (values hidden)
        #[arg(long)]
        keys: bool,
    },
}

pub fn execute(args: EnvArgs) -> Result<()> {
    let mut manager = EnvManager::current()?;

    match args.command {
        EnvCommands::Init => {
            let report = manager.init()?;
            println!("🔧 Initializing AI Rails environment");
            for path in &report.created {
                println!("  {} Created {}", "✓".green(), path.display());
            }
            if report.created.is_empty() {
                println!("  All templates already exist");
            }
            if report.gitignore_updated {
                println!("  {} Updated .gitignore", "✓".green());
            }
            println!(
                "\n📊 Loaded {} file(s), {} setting(s)",
                report.loaded_files, report.total_settings
            );
            println!("\nNext: add your API keys to the global file, then run 'ai-rails env show'");
        }
        EnvCommands::Show { keys } => {
            println!("{}", "Environment Files (later overrides earlier)".bold());
            println!("{}", "═".repeat(60));
            for (i, file) in manager.status().iter().enumerate() {
                let state = match file.size {
                    Some(size) => format!("✅ {} bytes", size).green(),
                    None => "❌ missing".dimmed(),
                };
                println!(
                    "{}. {:<10} {} {}",
                    i + 1,
                    file.label,
                    file.path.display(),
                    state
                );
            }

            if keys {
                let merged = manager.merged()?;
                println!("\n{} ({})", "Merged settings".bold(), merged.len());
                for (key, value) in &merged {
                    let shown = if value.is_empty() { "(empty)" } else { "(set)" };
                    println!("  {} {}", key, shown.dimmed());
                }
            }
        }
    }
    Ok(())
}
