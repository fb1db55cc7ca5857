//! `ai-rails access` command
//!
//! # Usage
//! ```bash
//! ai-rails access check inputs-to-outputs/demo-actual/out.py
//! ai-rails access rules
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::core::access::AccessControl;

#[derive(Args, Debug)]
pub struct AccessArgs {
    #[command(subcommand)]
    pub command: AccessCommands,
}

#[derive(Subcommand, Debug)]
pub enum AccessCommands {
    /// Check whether paths may be read
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List active restriction rules
    Rules,
}

pub fn execute(args: AccessArgs) -> Result<()> {
    let control = AccessControl::from_cwd()?;

    match args.command {
        AccessCommands::Check { paths } => {
            let mut denied = 0;
            for path in &paths {
                match control.matching_rule(path) {
                    Some(rule) => {
                        denied += 1;
                        println!(
                            "{} {} ({} rule: {})",
                            "🚫 restricted".red(),
                            path.display(),
                            rule.kind,
                            rule.pattern
                        );
                    }
                    None => println!("{} {}", "✅ allowed".green(), path.display()),
                }
            }
            if denied > 0 {
                println!("\n{}", AccessControl::restriction_message());
                std::process::exit(1);
            }
        }
        AccessCommands::Rules => {
            for rule in control.rules() {
                println!("  {:<8} {}", rule.kind.to_string(), rule.pattern);
            }
        }
    }
    Ok(())
}
