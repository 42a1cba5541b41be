//! Fixed-capacity worker pool bound to one category.
//!
//! Each submission runs as its own tokio task, so a handler that errors or
//! panics only ever affects its own unit of work. A semaphore with
//! `capacity` permits gates execution; callers are expected to respect the
//! capacity anyway (the dispatcher does), so in practice the semaphore never
//! queues anything.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::Config;
use crate::job::{Job, Outcome};
use crate::ports::JobHandler;
use crate::types::JobId;

pub struct WorkerPool {
    category: String,
    state: String,
    capacity: usize,
    handler: Arc<dyn JobHandler>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        category: impl Into<String>,
        state: impl Into<String>,
        capacity: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            category: category.into(),
            state: state.into(),
            capacity,
            handler,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start processing `job` and return a handle to poll for its outcome.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, job: Job, config: Arc<Config>) -> JobHandle {
        let job_id = job.id;
        let handler = Arc::clone(&self.handler);
        let permits = Arc::clone(&self.permits);
        let span = tracing::info_span!(
            "job",
            category = %self.category,
            state = %self.state,
            job_id
        );

        let join = tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Outcome::failure("worker pool closed before the job started");
                };

                let start = Instant::now();
                let result = handler.process(&job, &config).await;
                let elapsed_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(()) => {
                        tracing::debug!(elapsed_ms, "Handler finished");
                        Outcome::Success
                    }
                    Err(e) => {
                        tracing::debug!(elapsed_ms, error = %e, "Handler returned an error");
                        Outcome::failure(e.to_string())
                    }
                }
            }
            .instrument(span),
        );

        JobHandle { job_id, join }
    }
}

/// Handle to one submitted unit of work.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    join: JoinHandle<Outcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Non-blocking completion check.
    pub fn is_done(&self) -> bool {
        self.join.is_finished()
    }

    /// Collect the outcome.
    ///
    /// Resolves immediately once [`is_done`](Self::is_done) reports `true`;
    /// awaiting an unfinished handle waits for the job. A panicking handler
    /// is reported as a failure rather than propagated.
    pub async fn outcome(self) -> Outcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Outcome::failure(format!(
                "handler panicked: {}",
                panic_message(e.into_panic().as_ref())
            )),
            Err(e) => Outcome::failure(format!("worker task aborted: {e}")),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
