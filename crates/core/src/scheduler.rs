//! Round-robin tick loop over all registered dispatchers.
//!
//! One pass ticks every dispatcher in registration order; the loop then
//! sleeps for the fixed poll interval before starting the next pass. An
//! error or panic from one dispatcher's tick is logged and the pass moves
//! on to the next dispatcher.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatcher::{CategoryDispatcher, CategorySpec, DispatcherStatus};
use crate::ports::{JobHandler, JobSource};

/// Totals for one full pass over the dispatchers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub ticked: usize,
    pub tick_errors: usize,
    pub submitted: usize,
    pub reaped: usize,
    pub job_failures: usize,
}

pub struct Scheduler {
    config: Arc<Config>,
    source: Arc<dyn JobSource>,
    dispatchers: Vec<CategoryDispatcher>,
    poll_interval: Duration,
}

impl Scheduler {
    /// Create a scheduler polling every `config.poll_interval`.
    pub fn new(config: Arc<Config>, source: Arc<dyn JobSource>) -> Self {
        let poll_interval = config.poll_interval;
        Self {
            config,
            source,
            dispatchers: Vec::new(),
            poll_interval,
        }
    }

    /// Override the delay between passes.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Add a dispatcher for `(category, state)`.
    ///
    /// Does nothing when `worker_count` is zero.
    pub fn register(
        &mut self,
        category: &str,
        state: &str,
        handler: Arc<dyn JobHandler>,
        worker_count: usize,
    ) {
        if worker_count < 1 {
            tracing::debug!(category, state, "Skipping stage with no workers");
            return;
        }
        self.dispatchers.push(CategoryDispatcher::new(CategorySpec::new(
            category,
            state,
            handler,
            worker_count,
        )));
    }

    pub fn dispatchers(&self) -> &[CategoryDispatcher] {
        &self.dispatchers
    }

    pub fn status(&self) -> Vec<DispatcherStatus> {
        self.dispatchers.iter().map(CategoryDispatcher::status).collect()
    }

    /// Run passes until `cancel` is triggered.
    ///
    /// In-flight jobs are neither drained nor cancelled on shutdown.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!(
            dispatchers = self.dispatchers.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Scheduler started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.run_pass().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        let abandoned: usize = self.dispatchers.iter().map(|d| d.in_flight_count()).sum();
        tracing::info!(abandoned, "Scheduler shutting down");
    }

    /// Tick every dispatcher once, in registration order.
    pub async fn run_pass(&mut self) -> PassSummary {
        let mut summary = PassSummary::default();

        for dispatcher in &mut self.dispatchers {
            summary.ticked += 1;

            let category = dispatcher.category().to_string();
            let state = dispatcher.state().to_string();
            let tick = dispatcher.tick(self.source.as_ref(), &self.config);

            match AssertUnwindSafe(tick).catch_unwind().await {
                Ok(Ok(report)) => {
                    summary.reaped += report.reaped.len();
                    summary.job_failures += report.failures();
                    summary.submitted += usize::from(report.submitted.is_some());
                }
                Ok(Err(e)) => {
                    summary.tick_errors += 1;
                    tracing::error!(
                        category = %category,
                        state = %state,
                        error = %e,
                        chain = %error_chain(&e),
                        "Dispatcher tick failed",
                    );
                }
                Err(panic) => {
                    summary.tick_errors += 1;
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "<non-string panic payload>".to_string());
                    tracing::error!(
                        category = %category,
                        state = %state,
                        panic = %message,
                        "Dispatcher tick panicked",
                    );
                }
            }
        }

        summary
    }
}

/// Render an error and all of its sources, outermost first.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": caused by: ")
}
