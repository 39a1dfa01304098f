//! Executor command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::executor::{ExecutorHealth, ExecutorStatus};

use crate::config::Config;

/// Executor subcommands
#[derive(Subcommand)]
pub enum ExecutorCommands {
    /// List registered executors with health and load
    List,
}

/// Handle executor commands
pub async fn handle_executor_command(command: ExecutorCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        ExecutorCommands::List => list_executors(&client).await,
    }
}

async fn list_executors(client: &OrchestratorClient) -> Result<()> {
    let executors = client.list_executors().await?;

    if executors.is_empty() {
        println!("{}", "No executors registered.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} registered executor(s):", executors.len()).bold()
        );
        println!();
        for executor in executors {
            print_executor(&executor);
        }
    }

    Ok(())
}

fn print_executor(executor: &ExecutorStatus) {
    let health = match executor.health {
        ExecutorHealth::Healthy => executor.health.to_string().green(),
        ExecutorHealth::Unhealthy => executor.health.to_string().red(),
        ExecutorHealth::Unknown => executor.health.to_string().dimmed(),
    };

    println!("  {} {}", "▸".cyan(), executor.kind.to_string().bold());
    println!("    URL:          {}", executor.base_url);
    println!("    Health:       {}", health);
    println!(
        "    In flight:    {}/{}",
        executor.in_flight, executor.max_concurrency
    );
    println!("    Timeout:      {}ms", executor.timeout_ms);
    if executor.consecutive_failures > 0 {
        println!(
            "    Failed checks: {}",
            executor.consecutive_failures.to_string().red()
        );
    }
    if let Some(checked) = executor.last_checked_at {
        println!(
            "    Last check:   {}",
            checked.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}
