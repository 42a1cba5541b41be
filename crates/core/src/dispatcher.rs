//! Per-(category, state) dispatcher.
//!
//! A [`CategoryDispatcher`] owns one [`WorkerPool`] and the set of jobs it
//! currently has in flight. Every [`tick`](CategoryDispatcher::tick) reaps
//! finished jobs first, then, if there is spare capacity, fetches at most
//! one new job from the [`JobSource`] and submits it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::DispatchError;
use crate::job::Outcome;
use crate::pool::{JobHandle, WorkerPool};
use crate::ports::{JobHandler, JobSource};
use crate::types::JobId;

/// Identifies one pipeline stage: which jobs to claim, who processes them,
/// and how many may run at once.
#[derive(Clone)]
pub struct CategorySpec {
    pub category: String,
    pub state: String,
    pub handler: Arc<dyn JobHandler>,
    pub worker_count: usize,
}

impl CategorySpec {
    pub fn new(
        category: impl Into<String>,
        state: impl Into<String>,
        handler: Arc<dyn JobHandler>,
        worker_count: usize,
    ) -> Self {
        Self {
            category: category.into(),
            state: state.into(),
            handler,
            worker_count,
        }
    }
}

impl fmt::Debug for CategorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategorySpec")
            .field("category", &self.category)
            .field("state", &self.state)
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}

/// What a single tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs removed from the in-flight set, with their outcomes.
    pub reaped: Vec<(JobId, Outcome)>,
    /// Job submitted to the pool during this tick, if any.
    pub submitted: Option<JobId>,
}

impl TickReport {
    pub fn failures(&self) -> usize {
        self.reaped.iter().filter(|(_, o)| o.is_failure()).count()
    }
}

/// Point-in-time view of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStatus {
    pub category: String,
    pub state: String,
    pub capacity: usize,
    pub in_flight: usize,
    /// In-flight jobs that have finished but are not reaped yet.
    pub awaiting_reap: usize,
}

pub struct CategoryDispatcher {
    spec: CategorySpec,
    pool: WorkerPool,
    in_flight: HashMap<JobId, JobHandle>,
}

impl CategoryDispatcher {
    pub fn new(spec: CategorySpec) -> Self {
        let pool = WorkerPool::new(
            spec.category.clone(),
            spec.state.clone(),
            spec.worker_count,
            Arc::clone(&spec.handler),
        );
        let in_flight = HashMap::with_capacity(spec.worker_count);
        Self {
            spec,
            pool,
            in_flight,
        }
    }

    pub fn category(&self) -> &str {
        &self.spec.category
    }

    pub fn state(&self) -> &str {
        &self.spec.state
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, job_id: JobId) -> bool {
        self.in_flight.contains_key(&job_id)
    }

    pub fn status(&self) -> DispatcherStatus {
        DispatcherStatus {
            category: self.spec.category.clone(),
            state: self.spec.state.clone(),
            capacity: self.capacity(),
            in_flight: self.in_flight.len(),
            awaiting_reap: self.in_flight.values().filter(|h| h.is_done()).count(),
        }
    }

    /// Reap, then fetch and submit at most one job if capacity allows.
    ///
    /// Finished jobs are always reaped before a fetch error is returned, so
    /// a failing job source never leaks in-flight slots.
    pub async fn tick(
        &mut self,
        source: &dyn JobSource,
        config: &Arc<Config>,
    ) -> Result<TickReport, DispatchError> {
        let mut report = TickReport {
            reaped: self.reap_completed().await,
            submitted: None,
        };

        if self.in_flight.len() >= self.capacity() {
            return Ok(report);
        }

        let job = source
            .next_job(&self.spec.category, &self.spec.state)
            .await
            .map_err(|source| DispatchError::Fetch {
                category: self.spec.category.clone(),
                state: self.spec.state.clone(),
                source,
            })?;

        let Some(job) = job else {
            return Ok(report);
        };

        if self.in_flight.contains_key(&job.id) {
            return Err(DispatchError::AlreadyInFlight {
                category: self.spec.category.clone(),
                state: self.spec.state.clone(),
                job_id: job.id,
            });
        }

        tracing::debug!(
            job_id = job.id,
            category = %self.spec.category,
            state = %self.spec.state,
            "Scheduling job",
        );

        let job_id = job.id;
        let handle = self.pool.submit(job, Arc::clone(config));
        self.in_flight.insert(job_id, handle);
        report.submitted = Some(job_id);

        Ok(report)
    }

    /// Remove every finished job from the in-flight set and log failures.
    async fn reap_completed(&mut self) -> Vec<(JobId, Outcome)> {
        let done: Vec<JobId> = self
            .in_flight
            .iter()
            .filter(|(_, handle)| handle.is_done())
            .map(|(id, _)| *id)
            .collect();

        let mut reaped = Vec::with_capacity(done.len());
        for job_id in done {
            let Some(handle) = self.in_flight.remove(&job_id) else {
                continue;
            };
            let outcome = handle.outcome().await;

            match &outcome {
                Outcome::Success => {
                    tracing::debug!(
                        job_id,
                        category = %self.spec.category,
                        state = %self.spec.state,
                        "Job completed",
                    );
                }
                Outcome::Failure { detail } => {
                    tracing::error!(
                        job_id,
                        category = %self.spec.category,
                        state = %self.spec.state,
                        error = %detail,
                        "{}.{} processing of {} failed",
                        self.spec.category,
                        self.spec.state,
                        job_id
                    );
                }
            }

            reaped.push((job_id, outcome));
        }
        reaped
    }
}

impl fmt::Debug for CategoryDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryDispatcher")
            .field("spec", &self.spec)
            .field("in_flight", &self.in_flight.keys().collect::<Vec<_>>())
            .finish()
    }
}
