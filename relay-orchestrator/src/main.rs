use anyhow::{Context, Result};
use relay_orchestrator::api;
use relay_orchestrator::config::Config;
use relay_orchestrator::service::{Collaborators, Orchestrator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Relay Orchestrator...");

    let config = load_config()?;
    info!(
        "Loaded configuration: {} executor kinds, run deadline {:?}, ticket sink {}",
        config.executors.len(),
        config.run_deadline,
        if config.jira.is_some() { "jira" } else { "log" }
    );
    for (kind, exec) in &config.executors {
        info!(
            "  - {} -> {} (timeout {:?}, concurrency {})",
            kind, exec.base_url, exec.timeout, exec.max_concurrency
        );
    }

    let orchestrator = Orchestrator::new(&config, Collaborators::from_config(&config));
    let _health_checks = orchestrator.start_health_checks(config.health_check_interval);

    // Build router with all API endpoints
    let app = api::create_router(orchestrator);

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// Load configuration from environment, falling back to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
