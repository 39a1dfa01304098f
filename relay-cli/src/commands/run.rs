//! Run command handlers
//!
//! Submitting text, listing and inspecting runs, cancelling them.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::outcome::{Classification, RunOutcome};
use relay_core::domain::run::{Run, RunSource};
use relay_core::dto::run::{RunListing, RunView, SubmitRun};
use std::time::Duration;

use super::{colorize_state, colorize_status};
use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Submit a free-form request
    Submit {
        /// What should be done, in plain words
        text: String,

        /// Where the request came from
        #[arg(long, value_enum, default_value_t = SourceArg::Manual)]
        source: SourceArg,

        /// Originating ticket key
        #[arg(long)]
        ticket: Option<String>,

        /// Wait for the run to finish and print its outcome
        #[arg(short, long)]
        wait: bool,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 900)]
        timeout: u64,
    },
    /// List runs
    List {
        /// Only runs that have not finished
        #[arg(long)]
        active: bool,
    },
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Show the outcome of a finished run
    Outcome {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Cancel a run that has not finished
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Manual,
    Webhook,
    Simulated,
}

impl From<SourceArg> for RunSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Manual => RunSource::Manual,
            SourceArg::Webhook => RunSource::Webhook,
            SourceArg::Simulated => RunSource::Simulated,
        }
    }
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Submit {
            text,
            source,
            ticket,
            wait,
            timeout,
        } => submit_run(&client, text, source.into(), ticket, wait, timeout).await,
        RunCommands::List { active } => list_runs(&client, active).await,
        RunCommands::Get { id } => get_run(&client, &id).await,
        RunCommands::Outcome { id } => get_outcome(&client, &id).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
    }
}

/// Submit text, optionally waiting for the outcome
async fn submit_run(
    client: &OrchestratorClient,
    text: String,
    source: RunSource,
    ticket_key: Option<String>,
    wait: bool,
    timeout: u64,
) -> Result<()> {
    let handle = client
        .submit_run(SubmitRun {
            text,
            source,
            ticket_key,
        })
        .await?;

    println!("{}", "✓ Run submitted".green().bold());
    println!("  ID:    {}", handle.run_id.to_string().cyan());
    println!("  State: {}", colorize_state(handle.state));

    if !wait {
        return Ok(());
    }

    println!("\n{}", "Waiting for the run to finish...".dimmed());
    let run = client
        .wait_for_run(
            handle.run_id,
            Duration::from_millis(500),
            Duration::from_secs(timeout),
        )
        .await?;

    println!();
    match &run.outcome {
        Some(outcome) => print_outcome(outcome),
        None => print_run_details(&run),
    }

    Ok(())
}

/// List runs, newest first
async fn list_runs(client: &OrchestratorClient, active: bool) -> Result<()> {
    let view = if active { RunView::Active } else { RunView::All };
    let runs = client.list_runs(view).await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(())
}

async fn get_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    let run = client.get_run(uuid).await?;
    print_run_details(&run);

    Ok(())
}

async fn get_outcome(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    match client.get_outcome(uuid).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) if e.is_conflict() => {
            println!("{}", format!("Run {} has not finished yet.", uuid).yellow());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let id_or_prefix = IdOrPrefix::parse(id);
    let uuid = resolve_run_id(client, &id_or_prefix).await?;

    let handle = client
        .cancel_run(uuid)
        .await
        .with_context(|| format!("Failed to cancel run {}", id_or_prefix))?;

    println!("{}", "✓ Cancellation requested".green().bold());
    println!("  ID:    {}", handle.run_id.to_string().cyan());
    println!("  State: {}", colorize_state(handle.state));

    Ok(())
}

fn print_run_summary(run: &RunListing) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    State:    {}", colorize_state(run.state));
    println!("    Source:   {}", run.source);
    if let Some(key) = &run.ticket_key {
        println!("    Ticket:   {}", key);
    }
    println!("    Tasks:    {}/{} done", run.result_count, run.task_count);
    if let Some(classification) = run.classification {
        println!("    Result:   {}", colorize_classification(classification));
    }
    println!(
        "    Created:  {}",
        run.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:       {}", run.id.to_string().cyan());
    println!("  State:    {}", colorize_state(run.state));
    println!("  Source:   {}", run.source);
    if let Some(key) = &run.ticket_key {
        println!("  Ticket:   {}", key);
    }
    println!("  Created:  {}", run.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:  {}", run.updated_at.format("%Y-%m-%d %H:%M:%S"));

    println!("\n{}", "Input:".bold());
    for line in run.raw_input.lines() {
        println!("  {}", line.dimmed());
    }

    if !run.tasks.is_empty() {
        println!("\n{}", "Tasks:".bold());
        for task in &run.tasks {
            let status = match run.results.get(&task.id) {
                Some(result) => colorize_status(result.status),
                None => "pending".dimmed(),
            };
            println!(
                "  {} {} [{}] {}",
                task.id.cyan(),
                status,
                task.kind,
                task.description
            );
            if let Some(error) = run.results.get(&task.id).and_then(|r| r.error.as_ref()) {
                println!("      {}", error.to_string().red());
            }
        }
    }

    if let Some(error) = &run.error {
        println!("\n{} {}", "Error:".red().bold(), error);
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed { run_id, summary } => {
            println!(
                "{} {}",
                "Outcome:".bold(),
                colorize_classification(summary.classification)
            );
            println!("  Run:       {}", run_id.to_string().dimmed());
            println!(
                "  Tasks:     {} total, {} succeeded, {} failed, {} timed out",
                summary.total, summary.succeeded, summary.failed, summary.timed_out
            );

            for task in &summary.tasks {
                println!(
                    "\n  {} {} [{}] {}",
                    "▸".cyan(),
                    colorize_status(task.status),
                    task.kind,
                    task.description
                );
                println!("      Duration: {}ms", task.duration_ms);
                if let Some(error) = &task.error {
                    println!("      Error:    {}", error.to_string().red());
                }
                if let Some(payload) = &task.payload {
                    let pretty = serde_json::to_string_pretty(payload)
                        .unwrap_or_else(|_| payload.to_string());
                    for line in pretty.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }
        RunOutcome::Failed { run_id, error } => {
            println!("{} {}", "Outcome:".bold(), "failed".red());
            println!("  Run:   {}", run_id.to_string().dimmed());
            println!("  Error: {}", error.to_string().red());
        }
    }
}

fn colorize_classification(classification: Classification) -> ColoredString {
    match classification {
        Classification::CompletedAll => classification.to_string().green(),
        Classification::PartialFailure => classification.to_string().yellow(),
        Classification::FailedAll => classification.to_string().red(),
        Classification::NoActionableTasks => classification.to_string().dimmed(),
    }
}
