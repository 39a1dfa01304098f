//! Configuration module
//!
//! Settings resolved from command-line flags and the environment.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the orchestrator's HTTP API
    pub orchestrator_url: String,
}
