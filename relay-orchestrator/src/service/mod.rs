//! Service Module
//!
//! Business logic of the engine. The orchestrator drives runs and owns the
//! other services; everything else is one stage or collaborator of a run.

pub mod aggregate;
pub mod dispatch;
pub mod executor;
pub mod extraction;
pub mod feedback;
pub mod jira;
pub mod orchestrator;
pub mod registry;
pub mod validation;

pub use orchestrator::{Collaborators, Orchestrator, OrchestratorError};
