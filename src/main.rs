//! convoy - a batch service scheduler.
//!
//! Usage:
//!   convoy run <settings.yaml>      Run the scheduler
//!   convoy validate <settings.yaml> Validate settings without running

use clap::{Parser, Subcommand};
use convoy::api::{create_api_state, start_server, ApiConfig};
use convoy::{load_settings, Event, EventBus, EventHandler, ProcessRuntime, Scheduler, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// convoy - a batch service scheduler
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler with the given settings file
    Run {
        /// Path to the YAML settings file
        #[arg(value_name = "SETTINGS")]
        settings: PathBuf,
    },

    /// Validate a settings file without running
    Validate {
        /// Path to the YAML settings file
        #[arg(value_name = "SETTINGS")]
        settings: PathBuf,
    },
}

/// Simple logging event handler that prints scheduler events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::ServiceStarted {
                queue, service_id, ..
            } => {
                info!("Queue '{}' started service {}", queue, service_id);
            }
            Event::ServiceTerminating { queue, clean, .. } => {
                if *clean {
                    info!("Queue '{}' service terminating cleanly", queue);
                } else {
                    warn!("Queue '{}' service terminating with an error", queue);
                }
            }
            Event::QueueSuspended { queue, .. } => {
                info!("Queue '{}' suspended", queue);
            }
            Event::QueueResumed { queue, .. } => {
                info!("Queue '{}' resumed", queue);
            }
            Event::QueueRemoved { queue, .. } => {
                info!("Queue '{}' drained", queue);
            }
            Event::QueuePurged { queue, dropped, .. } => {
                warn!("Queue '{}' purged, {} pending configuration(s) dropped", queue, dropped);
            }
            Event::SchedulerStopped { .. } => {
                info!("All queues drained");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { settings } => {
            run_scheduler(settings).await?;
        }
        Commands::Validate { settings } => {
            validate_settings(settings)?;
        }
    }

    Ok(())
}

/// Run the scheduler from a settings file.
async fn run_scheduler(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading settings from: {}", path.display());

    let settings = load_settings(&path)?;
    let deps = settings.validate()?;

    info!(
        "Loaded {} seed queue(s), {} dependency pair(s)",
        settings.queues.len(),
        settings.queue_dependencies.len()
    );

    // Create event bus with logging handler
    let event_bus = EventBus::new();
    event_bus.register(Arc::new(LoggingHandler)).await;

    // Create the process runtime and the scheduler
    let runtime = ProcessRuntime::new();
    let scheduler = Scheduler::new(runtime)
        .with_dependencies(deps)
        .with_event_bus(event_bus)
        .with_purge_on_error(settings.purge_on_error)
        .with_suspend_dependants(settings.suspend_dependants)
        .with_stop_when_done(settings.stop_when_done)
        .with_seed_queues(settings.seed_queues());

    let (handle, scheduler_task) = scheduler.start().await;

    // The command surface stays down for static queue sets.
    let api_task = if settings.queues_static {
        info!("Static queues: command surface disabled");
        None
    } else {
        let api_config = ApiConfig::new(settings.api.host.clone(), settings.api.port);
        let state = create_api_state(handle.clone());
        Some(start_server(api_config, state).await?)
    };

    info!("Scheduler running; press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("\nShutting down...");
            handle.shutdown().await?;
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    if let Some(api_task) = api_task {
        api_task.abort();
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate a settings file without running.
fn validate_settings(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating settings in: {}", path.display());

    let settings: Settings = load_settings(&path)?;
    match settings.validate() {
        Ok(_) => {
            info!("Settings are valid:");
            for seed in &settings.queues {
                info!("  - queue '{}': {} configuration(s)", seed.queue, seed.services.len());
            }
            for pair in &settings.queue_dependencies {
                info!(
                    "  - '{}' waits for: {}",
                    pair.queue,
                    pair.depends_on.join(", ")
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}
