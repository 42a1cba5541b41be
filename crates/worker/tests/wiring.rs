//! Integration tests for stage wiring.
//!
//! Build a scheduler from configuration variables and drive it against an
//! in-memory job source with real command handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;

use procd_core::{Config, Job, JobSource, JobSourceError};
use procd_worker::stages::Stage;
use procd_worker::wiring::{build_scheduler, build_scheduler_for, WiringError};

/// Job source handing out queued jobs for any matching (category, state).
#[derive(Default)]
struct MemorySource {
    jobs: Mutex<VecDeque<Job>>,
}

impl MemorySource {
    fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
        }
    }
}

#[async_trait]
impl JobSource for MemorySource {
    async fn next_job(&self, category: &str, state: &str) -> Result<Option<Job>, JobSourceError> {
        let mut jobs = self.jobs.lock().expect("lock");
        let pos = jobs
            .iter()
            .position(|j| j.category == category && j.state == state);
        Ok(pos.and_then(|p| jobs.remove(p)))
    }
}

fn config(vars: &[(&str, &str)]) -> Arc<Config> {
    let mut all = vec![("JOB_SOURCE_URL", "http://api.test")];
    all.extend_from_slice(vars);
    Arc::new(Config::from_vars(all).expect("config"))
}

// ---------------------------------------------------------------------------
// Test: stage registration
// ---------------------------------------------------------------------------

#[test]
fn only_stages_with_workers_are_registered_in_order() {
    let config = config(&[
        ("WORKERS_AUDIO_CONVERT", "2"),
        ("HANDLER_AUDIO_CONVERT_COMMAND", "convert.sh"),
        ("WORKERS_AUDIO_ANALYSIS", "0"),
        ("WORKERS_THERMAL", "1"),
        ("HANDLER_THERMAL_COMMAND", "classify.sh"),
    ]);

    let scheduler =
        build_scheduler(config, Arc::new(MemorySource::default())).expect("wired scheduler");

    let registered: Vec<_> = scheduler
        .status()
        .into_iter()
        .map(|s| (s.category, s.state, s.capacity))
        .collect();
    assert_eq!(
        registered,
        vec![
            ("audio".to_string(), "toMp3".to_string(), 2),
            ("thermalRaw".to_string(), "getMetadata".to_string(), 1),
        ]
    );
}

#[test]
fn no_workers_means_no_dispatchers() {
    let scheduler = build_scheduler(config(&[]), Arc::new(MemorySource::default()))
        .expect("wired scheduler");
    assert!(scheduler.dispatchers().is_empty());
}

#[test]
fn enabled_stage_without_command_is_rejected() {
    let result = build_scheduler(
        config(&[("WORKERS_THERMAL", "2")]),
        Arc::new(MemorySource::default()),
    );

    let err = result.err().expect("wiring should fail");
    assert_matches!(err, WiringError::MissingCommand { ref stage } if stage == "thermal");
    assert_eq!(
        err.to_string(),
        "Stage thermal has workers but no HANDLER_THERMAL_COMMAND"
    );
}

// ---------------------------------------------------------------------------
// Test: end-to-end pass with command handlers
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn command_failures_are_reaped_as_job_failures() {
    let stages = [Stage {
        key: "probe",
        category: "audio",
        state: "analyse",
    }];
    let config = config(&[
        ("WORKERS_PROBE", "2"),
        ("HANDLER_PROBE_COMMAND", r#"test "$JOB_ID" != 2 || { echo 'bad header' >&2; exit 1; }"#),
    ]);
    let source = MemorySource::with_jobs([
        Job::new(1, "audio", "analyse", serde_json::json!({ "id": 1 })),
        Job::new(2, "audio", "analyse", serde_json::json!({ "id": 2 })),
        Job::new(3, "thermalRaw", "getMetadata", serde_json::json!({ "id": 3 })),
    ]);

    let mut scheduler =
        build_scheduler_for(&stages, config, Arc::new(source)).expect("wired scheduler");

    let first = scheduler.run_pass().await;
    let second = scheduler.run_pass().await;
    assert_eq!(first.submitted + second.submitted, 2);

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let status = scheduler.status().remove(0);
            if status.awaiting_reap == status.in_flight {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("commands finished");

    let third = scheduler.run_pass().await;
    assert_eq!(second.reaped + third.reaped, 2);
    assert_eq!(second.job_failures + third.job_failures, 1);
    // Job 3 belongs to another stage and is never claimed here.
    assert_eq!(third.submitted, 0);
    assert_eq!(scheduler.status()[0].in_flight, 0);
}
