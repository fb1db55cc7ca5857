//! `ai-rails approvals` command
//!
//! Review approval requests stored by the approval server.
//!
//! # Usage
//! ```bash
//! ai-rails approvals list
//! ai-rails approvals get 01HQ...
//! ai-rails approvals decide 01HQ... --reject --notes "missing edge cases"
//! ai-rails approvals review        # interactive
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use dialoguer::{Input, Select};

use super::utils::{state_manager, truncate};
use crate::config::Config;
use crate::core::state_manager::StateManager;
use crate::core::workflow::{ApprovalRequest, ApprovalStatus};

#[derive(Args, Debug)]
pub struct ApprovalsArgs {
    #[command(subcommand)]
    pub command: ApprovalsCommands,
}

#[derive(Subcommand, Debug)]
pub enum ApprovalsCommands {
    /// Show one approval request
    Get { approval_id: String },

    /// List approval requests
    List {
        /// Only pending requests
        #[arg(long)]
        pending: bool,
    },

    /// Approve or reject a request
    Decide {
        approval_id: String,

        /// Reject instead of approve
        #[arg(long)]
        reject: bool,

        /// Reviewer notes (required when rejecting)
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Step through pending requests interactively
    Review,
}

pub async fn execute(args: ApprovalsArgs, config: &Config) -> Result<()> {
    let manager = state_manager(config).await?;

    match args.command {
        ApprovalsCommands::Get { approval_id } => {
            let request = manager
                .get_approval_request(&approval_id)
                .await
                .ok_or_else(|| anyhow::anyhow!("Approval request not found: {}", approval_id))?;
            print_request(&request, true);
        }
        ApprovalsCommands::List { pending } => {
            let requests = load_all(&manager, pending).await;
            if requests.is_empty() {
                println!("No approval requests found.");
                return Ok(());
            }
            for request in &requests {
                print_request(request, false);
            }
            println!("\n{} request(s)", requests.len());
        }
        ApprovalsCommands::Decide {
            approval_id,
            reject,
            notes,
        } => {
            let notes = notes.unwrap_or_default();
            decide(&manager, &approval_id, !reject, &notes).await?;
        }
        ApprovalsCommands::Review => review(&manager).await?,
    }
    Ok(())
}

async fn load_all(manager: &StateManager, pending_only: bool) -> Vec<ApprovalRequest> {
    let mut requests = Vec::new();
    for id in manager.list_approvals().await {
        if let Some(request) = manager.get_approval_request(&id).await {
            if !pending_only || request.status == ApprovalStatus::Pending {
                requests.push(request);
            }
        }
    }
    requests.sort_by_key(|r| r.created_at);
    requests
}

async fn decide(manager: &StateManager, approval_id: &str, approved: bool, notes: &str) -> Result<()> {
    if !approved && notes.trim().is_empty() {
        anyhow::bail!("Notes are required when rejecting");
    }
    if !manager.update_approval_status(approval_id, approved, notes).await {
        anyhow::bail!("Failed to record decision for {}", approval_id);
    }
    let verdict = if approved {
        "approved".green()
    } else {
        "rejected".red()
    };
    println!("{} {} {}", "✓".green(), approval_id.cyan(), verdict);
    Ok(())
}

async fn review(manager: &StateManager) -> Result<()> {
    let pending = load_all(manager, true).await;
    if pending.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    for request in pending {
        print_request(&request, true);
        let choice = Select::new()
            .with_prompt("Decision")
            .items(&["Approve", "Reject", "Skip", "Quit"])
            .default(2)
            .interact()?;
        match choice {
            0 => {
                let notes: String = Input::new()
                    .with_prompt("Notes")
                    .allow_empty(true)
                    .interact_text()?;
                decide(manager, &request.approval_id, true, &notes).await?;
            }
            1 => {
                let notes: String = Input::new()
                    .with_prompt("Reason for rejection")
                    .validate_with(|s: &String| {
                        if s.trim().is_empty() {
                            Err("feedback is required")
                        } else {
                            Ok(())
                        }
                    })
                    .interact_text()?;
                decide(manager, &request.approval_id, false, &notes).await?;
            }
            2 => continue,
            _ => break,
        }
    }
    Ok(())
}

fn print_request(request: &ApprovalRequest, full: bool) {
    let status = match request.status {
        ApprovalStatus::Pending => request.status.to_string().yellow(),
        ApprovalStatus::Approved => request.status.to_string().green(),
        ApprovalStatus::Rejected | ApprovalStatus::Expired => request.status.to_string().red(),
    };
    println!(
        "{} [{}] {} {}",
        request.approval_id.cyan().bold(),
        status,
        request.request_type,
        request.workflow_id.dimmed()
    );

    let remaining = request.remaining_seconds(Utc::now());
    if request.status == ApprovalStatus::Pending {
        println!("   expires in {}m", remaining.max(0) / 60);
    }
    if let Some(notes) = &request.notes {
        if !notes.is_empty() {
            println!("   notes: {}", notes);
        }
    }

    if full {
        println!("{}", "─".repeat(60));
        println!("{}", request.content);
        println!("{}", "─".repeat(60));
    } else {
        println!("   {}", truncate(request.content.lines().next().unwrap_or(""), 80).dimmed());
    }
}
