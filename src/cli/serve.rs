//! `ai-rails serve` command - start a local HTTP service

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};

use super::utils::state_manager;
use crate::config::Config;
use crate::core::state_manager::StateManager;
use crate::server::{self, approval, runner};

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(subcommand)]
    pub service: Service,

    /// Bind address (default from config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port (default from config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Do not mirror records into the state store
    #[arg(long, global = true)]
    pub no_state: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum Service {
    /// Human approval webhook server
    Approval,
    /// Pytest execution service
    Runner,
}

pub async fn run(args: ServeArgs, config: &Config) -> Result<()> {
    let host = args.host.clone().unwrap_or_else(|| config.server.host.clone());
    let manager = if args.no_state {
        None
    } else {
        Some(Arc::new(connect(config).await?))
    };

    match args.service {
        Service::Approval => {
            let port = args.port.unwrap_or(config.server.approval_port);
            let mut state = approval::ApprovalState::new(
                config.server.base_url.clone(),
                Duration::from_secs(config.server.approval_ttl_secs),
            );
            if let Some(m) = manager {
                state = state.with_state_manager(m);
            }
            eprintln!("🚀 Approval server on {}:{}", host, port);
            eprintln!("🔗 Approval links: {}/approve/<id>", config.server.base_url);
            server::serve(approval::router(state), &host, port, "Approval server").await
        }
        Service::Runner => {
            let port = args.port.unwrap_or(config.server.runner_port);
            let mut state = runner::RunnerState::new(config.runner.python.clone());
            if let Some(m) = manager {
                state = state.with_state_manager(m);
            }
            eprintln!("🚀 Test runner on {}:{}", host, port);
            server::serve(runner::router(state), &host, port, "Test runner").await
        }
    }
}

async fn connect(config: &Config) -> Result<StateManager> {
    let manager = state_manager(config).await?;
    if manager.is_using_memory() {
        eprintln!("⚠ Redis unavailable, records are kept in memory only");
    }
    Ok(manager)
}
