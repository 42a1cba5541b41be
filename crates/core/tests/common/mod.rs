#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use procd_core::{
    CategoryDispatcher, Config, HandlerError, Job, JobHandler, JobId, JobSource, JobSourceError,
};

/// Build a test `Config` pointing at a fake job source.
pub fn test_config() -> Arc<Config> {
    Arc::new(
        Config::from_vars([("JOB_SOURCE_URL", "http://job-source.test")]).expect("test config"),
    )
}

pub fn job(id: JobId) -> Job {
    Job::new(id, "audio", "toMp3", serde_json::json!({ "id": id }))
}

// ---------------------------------------------------------------------------
// Job source fake
// ---------------------------------------------------------------------------

/// In-memory job source that hands out queued jobs in order and counts
/// every `next_job` call.
#[derive(Default)]
pub struct QueueSource {
    jobs: Mutex<VecDeque<Job>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl QueueSource {
    pub fn with_jobs(ids: impl IntoIterator<Item = JobId>) -> Self {
        Self {
            jobs: Mutex::new(ids.into_iter().map(job).collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, job: Job) {
        self.jobs.lock().expect("lock").push_back(job);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// While set, every `next_job` call fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobSource for QueueSource {
    async fn next_job(&self, _category: &str, _state: &str) -> Result<Option<Job>, JobSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(JobSourceError::Unavailable("connection refused".to_string()));
        }
        Ok(self.jobs.lock().expect("lock").pop_front())
    }
}

// ---------------------------------------------------------------------------
// Handler fake
// ---------------------------------------------------------------------------

/// Handler that blocks each job until the test releases it.
///
/// Jobs listed in `failing` return an error once released.
#[derive(Default)]
pub struct GatedHandler {
    gates: Mutex<HashMap<JobId, Arc<Notify>>>,
    failing: HashSet<JobId>,
    processed: Mutex<Vec<JobId>>,
}

impl GatedHandler {
    pub fn failing(ids: impl IntoIterator<Item = JobId>) -> Self {
        Self {
            failing: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    fn gate(&self, job_id: JobId) -> Arc<Notify> {
        Arc::clone(
            self.gates
                .lock()
                .expect("lock")
                .entry(job_id)
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Let `job_id` finish. Safe to call before the job has started.
    pub fn release(&self, job_id: JobId) {
        self.gate(job_id).notify_one();
    }

    pub fn processed(&self) -> Vec<JobId> {
        self.processed.lock().expect("lock").clone()
    }
}

#[async_trait]
impl JobHandler for GatedHandler {
    async fn process(&self, job: &Job, _config: &Config) -> Result<(), HandlerError> {
        self.gate(job.id).notified().await;
        self.processed.lock().expect("lock").push(job.id);
        if self.failing.contains(&job.id) {
            return Err(HandlerError::Failed(format!("classifier crashed on {}", job.id)));
        }
        Ok(())
    }
}

/// Wait until `count` in-flight jobs of `dispatcher` have finished running.
pub async fn wait_for_finished(dispatcher: &CategoryDispatcher, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.status().awaiting_reap < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("jobs did not finish in time");
}

/// Handler that succeeds straight away.
pub struct ImmediateHandler;

#[async_trait]
impl JobHandler for ImmediateHandler {
    async fn process(&self, _job: &Job, _config: &Config) -> Result<(), HandlerError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Collects formatted log lines emitted on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Capture every event on this thread until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().expect("lock"))
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Lines logged at ERROR level.
    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.trim_start().starts_with("ERROR"))
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
