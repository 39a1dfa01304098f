//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod event;
mod executor;
mod run;

pub use event::EventCommands;
pub use executor::ExecutorCommands;
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use relay_core::domain::result::TaskStatus;
use relay_core::domain::run::RunState;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit and inspect runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// System event log
    Events {
        #[command(subcommand)]
        command: EventCommands,
    },
    /// Executor health
    Executor {
        #[command(subcommand)]
        command: ExecutorCommands,
    },
}

/// Route a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Events { command } => event::handle_event_command(command, config).await,
        Commands::Executor { command } => {
            executor::handle_executor_command(command, config).await
        }
    }
}

fn colorize_state(state: RunState) -> ColoredString {
    match state {
        RunState::Received | RunState::Extracting => state.to_string().blue(),
        RunState::Dispatched | RunState::Aggregating => state.to_string().yellow(),
        RunState::Completed => state.to_string().green(),
        RunState::Failed => state.to_string().red(),
    }
}

fn colorize_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Success => status.to_string().green(),
        TaskStatus::Failure => status.to_string().red(),
        TaskStatus::Timeout => status.to_string().magenta(),
    }
}
