//! Scheduler construction from configuration.

use std::sync::Arc;

use procd_core::{Config, JobSource, Scheduler};

use crate::handlers::CommandHandler;
use crate::stages::{Stage, STAGES};

/// Startup errors. Any of these ends the process before the loop starts.
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error("Stage {stage} has workers but no HANDLER_{}_COMMAND", .stage.to_uppercase())]
    MissingCommand { stage: String },

    #[error("Invalid {name} for stage {stage}: {value:?}")]
    InvalidSetting {
        stage: String,
        name: &'static str,
        value: String,
    },
}

/// Register every enabled stage from [`STAGES`] on a new scheduler.
pub fn build_scheduler(
    config: Arc<Config>,
    source: Arc<dyn JobSource>,
) -> Result<Scheduler, WiringError> {
    build_scheduler_for(&STAGES, config, source)
}

/// Like [`build_scheduler`], for an explicit stage list.
///
/// Stages with a worker count of zero are skipped without requiring a
/// handler command.
pub fn build_scheduler_for(
    stages: &[Stage],
    config: Arc<Config>,
    source: Arc<dyn JobSource>,
) -> Result<Scheduler, WiringError> {
    let mut scheduler = Scheduler::new(Arc::clone(&config), source);

    for stage in stages {
        let workers = config.worker_count(stage.key);
        if workers == 0 {
            tracing::info!(stage = stage.key, "Stage disabled (no workers configured)");
            continue;
        }

        let handler = CommandHandler::from_config(stage.key, &config)?;
        tracing::info!(
            stage = stage.key,
            category = stage.category,
            state = stage.state,
            workers,
            command = %handler.command(),
            "Registering stage",
        );
        scheduler.register(stage.category, stage.state, Arc::new(handler), workers);
    }

    Ok(scheduler)
}
