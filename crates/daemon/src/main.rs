//! Lineflow - Main Entry Point
//! Job orchestrator over in-memory adapters, queue carried across restarts
//! through a JSON snapshot

use anyhow::{Context, Result};
use lineflow_core::application::{JobOrchestrator, OrchestratorDeps};
use lineflow_core::domain::Recipe;
use lineflow_core::port::DefaultJobFactory;
use lineflow_core::OrchestratorConfig;
use lineflow_infra_memory::{InMemoryJobRepository, InMemoryRecipeCatalog, LoggingDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("LINEFLOW_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("lineflow=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Lineflow v{} starting...", VERSION);

    // 2. Load configuration
    let config = match env_path("LINEFLOW_CONFIG_PATH") {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            OrchestratorConfig::from_json_str(&raw)?
        }
        None => OrchestratorConfig::from_env()?,
    };
    info!(
        strategy = ?config.strategy,
        boot_timeout_secs = config.boot_timeout_secs,
        "Configuration loaded"
    );

    let recipes = Arc::new(match env_path("LINEFLOW_RECIPES_PATH") {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read recipes {}", path.display()))?;
            let recipes: Vec<Recipe> = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid recipe file {}", path.display()))?;
            info!(count = recipes.len(), "Recipes loaded");
            InMemoryRecipeCatalog::with_recipes(recipes)
        }
        None => {
            warn!("LINEFLOW_RECIPES_PATH not set, persisted jobs cannot be restored");
            InMemoryRecipeCatalog::new()
        }
    });

    // 3. Initialize persistence
    let snapshot_path = env_path("LINEFLOW_SNAPSHOT_PATH");
    let repository = Arc::new(match &snapshot_path {
        Some(path) => InMemoryJobRepository::load_file(path)?,
        None => InMemoryJobRepository::new(),
    });

    // 4. Setup dependencies (DI wiring)
    let deps = OrchestratorDeps {
        repository: repository.clone(),
        factory: Arc::new(DefaultJobFactory::new()),
        recipes,
        dispatcher: Arc::new(LoggingDispatcher::new()),
        handlers: Vec::new(),
    };
    let boot_timeout_secs = config.boot_timeout_secs;
    let strategy = config.strategy.clone();
    let orchestrator = JobOrchestrator::new(deps, config);
    orchestrator.configure(strategy);

    // 5. Start the task queue and restore the queue
    orchestrator.start()?;
    if orchestrator.await_boot(boot_timeout_secs).await {
        warn!(boot_timeout_secs, "Resumed jobs did not report back before the boot timeout");
    }

    info!(jobs = orchestrator.jobs().len(), "System ready");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    orchestrator.stop().await;
    if let Some(path) = &snapshot_path {
        repository.write_file(path)?;
    }

    info!("Shutdown complete.");

    Ok(())
}

/// Path from an environment variable, `~` expanded
fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| PathBuf::from(shellexpand::tilde(&value).into_owned()))
}
