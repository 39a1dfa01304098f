//! Event command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::event::Event;
use relay_core::dto::event::EventQuery;

use crate::config::Config;
use crate::id_resolver::resolve_run_id;
use crate::types::IdOrPrefix;

/// Event subcommands
#[derive(Subcommand)]
pub enum EventCommands {
    /// Show the event log, oldest first
    List {
        /// Only events of this run (ID or unambiguous prefix)
        #[arg(long)]
        run: Option<String>,

        /// Only the most recent N events
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Hide all current events from later listings
    Clear,
}

/// Handle event commands
pub async fn handle_event_command(command: EventCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        EventCommands::List { run, limit } => list_events(&client, run, limit).await,
        EventCommands::Clear => clear_events(&client).await,
    }
}

async fn list_events(
    client: &OrchestratorClient,
    run: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let run_id = match run {
        Some(id) => Some(resolve_run_id(client, &IdOrPrefix::parse(&id)).await?),
        None => None,
    };

    let events = client
        .list_events(&EventQuery {
            since: None,
            run_id,
            limit,
        })
        .await?;

    if events.is_empty() {
        println!("{}", "No events recorded.".yellow());
        return Ok(());
    }

    println!("{}", "─".repeat(80).dimmed());
    for event in &events {
        print_event(event);
    }
    println!("{}", "─".repeat(80).dimmed());

    Ok(())
}

async fn clear_events(client: &OrchestratorClient) -> Result<()> {
    let cleared = client.clear_events().await?;
    println!(
        "{}",
        format!("✓ Cleared {} event(s)", cleared.hidden).green()
    );
    Ok(())
}

fn print_event(event: &Event) {
    let run = event
        .run_id
        .map(|id| id.to_string()[..8].to_string())
        .unwrap_or_else(|| "-".repeat(8));

    println!(
        "{} {} {:<12} {:<20} {}",
        event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
        run.dimmed(),
        event.service.to_string().cyan(),
        event.event_type.to_string().bold(),
        event.description
    );
}
