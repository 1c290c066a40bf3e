//! Quarry Runner
//!
//! A long-lived agent that polls the Quarry job broker for work, bounds
//! how many jobs run at once, and executes each accepted job in an
//! isolated worker process.
//!
//! Architecture:
//! - Configuration: environment-loaded settings, patchable by the broker
//! - Client: HTTP communication with the broker (jobs, scripts, traces)
//! - Services: business logic (registry, script resolution, trace buffering)
//! - Scheduler: job polling and lifecycle management
//! - Worker: child-process execution with streamed trace output
//!
//! The runner polls the broker on a fixed cadence, resolves a runner
//! script for each assigned job, and streams the worker's trace back to
//! the broker until the job reaches a terminal state.

mod api;
mod config;
mod scheduler;
mod service;
mod worker;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigManager, RunnerSettings};
use crate::scheduler::JobPoller;
use crate::service::{BrokerScriptResolver, JobRegistry, ScriptResolver};
use quarry_client::BrokerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Quarry Runner");

    // Load configuration
    let settings = load_settings()?;
    info!(
        "Loaded configuration: runner_id={}, broker_url={}",
        settings.runner_id, settings.broker_url
    );

    let config = Arc::new(ConfigManager::new(settings));

    // Initialize broker client
    let client = Arc::new(BrokerClient::new(config.broker_url()));

    info!("Broker client initialized");

    // Initialize services
    let scripts: Arc<dyn ScriptResolver> = Arc::new(BrokerScriptResolver::new(
        Arc::clone(&client),
        config.script_install_dir(),
        config.bundled_script_dir(),
    ));
    let registry = Arc::new(JobRegistry::new());

    info!("Services initialized");

    // Liveness endpoint, independent of job traffic
    let health_port = config.health_port();
    tokio::spawn(async move {
        if let Err(e) = api::serve(health_port).await {
            error!("Health server error: {:#}", e);
        }
    });

    // Create job poller
    let poller = JobPoller::new(config.clone(), client, registry, scripts);

    info!("Runner initialized successfully");
    info!(
        "Poll interval: {:?}, Trace flush interval: {:?}",
        config.check_interval(),
        config.trace_flush_interval()
    );

    // Start polling loop
    info!("Starting job polling loop");
    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads settings from environment variables with fallback to defaults
fn load_settings() -> Result<RunnerSettings> {
    match RunnerSettings::from_env() {
        Ok(settings) => {
            settings.validate()?;
            Ok(settings)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let settings = RunnerSettings::default();
            settings.validate()?;
            Ok(settings)
        }
    }
}
