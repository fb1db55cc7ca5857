//! `ai-rails state` command
//!
//! Inspect and edit persisted workflow state.
//!
//! # Usage
//! ```bash
//! ai-rails state health
//! ai-rails state list
//! ai-rails state get wf-01hq...
//! ai-rails state update wf-01hq... status=completed current_stage=done
//! ai-rails state results wf-01hq...
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};

use super::utils::{parse_assignments, state_manager};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommands,

    /// Print JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Check key-value store connectivity
    Health,

    /// Show one workflow
    Get { workflow_id: String },

    /// List workflow IDs
    List,

    /// Merge key=value pairs into a workflow
    Update {
        workflow_id: String,
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Delete a workflow
    Delete {
        workflow_id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Key counts
    Stats,

    /// Test results stored for a workflow
    Results { workflow_id: String },
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Test ID")]
    test_id: String,
    #[tabled(rename = "Suite")]
    suite: String,
    #[tabled(rename = "Passed")]
    passed: u32,
    #[tabled(rename = "Failed")]
    failed: u32,
    #[tabled(rename = "Coverage")]
    coverage: String,
    #[tabled(rename = "Executed")]
    executed_at: String,
}

pub async fn execute(args: StateArgs, config: &Config) -> Result<()> {
    let mut manager = state_manager(config).await?;
    if manager.is_using_memory() {
        eprintln!(
            "{} Redis unavailable, using in-memory storage (nothing persists)",
            "⚠".yellow()
        );
    }

    match args.command {
        StateCommands::Health => {
            let report = manager.health_check().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let status = match report.status.as_str() {
                    "healthy" => report.status.green(),
                    _ => report.status.red(),
                };
                println!("{}", "State Store".bold());
                println!("{}", "═".repeat(40));
                println!("Status:    {}", status);
                println!("Connected: {}", report.connected);
                println!("Fallback:  {}", report.using_memory_fallback);
                if let Some(info) = &report.backend {
                    println!("Backend:   {}", info.backend);
                    if let Some(v) = &info.redis_version {
                        println!("Version:   {}", v);
                    }
                    if let Some(keys) = info.keys {
                        println!("Keys:      {}", keys);
                    }
                    if let Some(mem) = &info.used_memory_human {
                        println!("Memory:    {}", mem);
                    }
                }
                if let Some(err) = &report.error {
                    println!("Error:     {}", err.red());
                }
            }
        }
        StateCommands::Get { workflow_id } => {
            let state = manager
                .get_workflow_state(&workflow_id)
                .await
                .ok_or_else(|| anyhow::anyhow!("Workflow not found: {}", workflow_id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                println!("{} {}", "Workflow".bold(), state.workflow_id.cyan());
                println!("  Status:   {}", state.status);
                println!("  Stage:    {}", state.current_stage);
                println!("  Feature:  {}", state.feature_description);
                println!("  Created:  {}", state.created_at.to_rfc3339());
                println!("  Updated:  {}", state.last_updated.to_rfc3339());
                println!("  TTL:      {}h", state.ttl_hours);
                if !state.metadata.is_empty() {
                    println!(
                        "  Metadata: {}",
                        serde_json::to_string_pretty(&state.metadata)?
                    );
                }
            }
        }
        StateCommands::List => {
            let mut ids = manager.list_workflows().await;
            ids.sort();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("No workflows found.");
            } else {
                for id in &ids {
                    println!("  {}", id.cyan());
                }
                println!("\n{} workflow(s)", ids.len());
            }
        }
        StateCommands::Update {
            workflow_id,
            assignments,
        } => {
            let updates = parse_assignments(&assignments)?;
            if !manager.update_workflow_state(&workflow_id, updates).await {
                anyhow::bail!("Failed to update workflow {}", workflow_id);
            }
            println!("{} Updated {}", "✓".green(), workflow_id.cyan());
        }
        StateCommands::Delete { workflow_id, force } => {
            if !force {
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt(format!("Delete workflow {}?", workflow_id))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            if manager.delete_workflow(&workflow_id).await {
                println!("{} Deleted {}", "✓".green(), workflow_id.cyan());
            } else {
                println!("Workflow not found: {}", workflow_id);
            }
        }
        StateCommands::Stats => {
            let stats = manager.stats().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("📊 {}", "State Statistics".bold());
                println!("  Active workflows: {}", stats.active_workflows);
                println!("  Approvals:        {}", stats.approvals);
                println!("  Test results:     {}", stats.stored_test_results);
                println!("  Total keys:       {}", stats.total_keys);
            }
        }
        StateCommands::Results { workflow_id } => {
            let results = manager.list_test_results(&workflow_id).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No test results for {}", workflow_id);
            } else {
                let rows: Vec<ResultRow> = results
                    .iter()
                    .map(|r| ResultRow {
                        test_id: r.test_id.clone(),
                        suite: r.test_suite.clone(),
                        passed: r.passed,
                        failed: r.failed,
                        coverage: r
                            .coverage_percent
                            .map(|c| format!("{:.1}%", c))
                            .unwrap_or_else(|| "-".to_string()),
                        executed_at: r.executed_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();
                println!("{}", Table::new(&rows));
            }
        }
    }

    manager.close();
    Ok(())
}
