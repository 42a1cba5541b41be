//! Collaborator interfaces consumed by the engine.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{HandlerError, JobSourceError};
use crate::job::Job;

/// Source of pending work and sole arbiter of job state.
///
/// Implementations must be safe to call repeatedly, return `Ok(None)` when
/// nothing matches, and never block indefinitely.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn next_job(&self, category: &str, state: &str) -> Result<Option<Job>, JobSourceError>;
}

/// Category-specific job processor.
///
/// Runs inside a worker pool task. Reporting completion or failure back to
/// the job source is the handler's own responsibility; the returned error
/// only feeds the dispatcher's failure log.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn process(&self, job: &Job, config: &Config) -> Result<(), HandlerError>;
}
