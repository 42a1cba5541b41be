//! Job handler that delegates each job to an external command.
//!
//! The command runs through `sh -c` with the job's JSON record on stdin and
//! the job's identity in its environment. The command itself is responsible
//! for reporting results back to the job source; this handler only turns a
//! non-zero exit, a timeout or a spawn failure into a [`HandlerError`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use procd_core::{Config, HandlerError, Job, JobHandler};

use super::subprocess::{self, SubprocessError};
use crate::wiring::WiringError;

/// Default wall-clock limit for one job.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Maximum stderr length quoted in a failure detail.
const MAX_DETAIL_STDERR: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandHandler {
    stage: String,
    command: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandHandler {
    pub fn new(stage: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            command: command.into(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the handler for `stage` from its `HANDLER_<STAGE>_*` settings.
    ///
    /// | Setting        | Required | Default |
    /// |----------------|----------|---------|
    /// | `COMMAND`      | yes      | --      |
    /// | `WORKDIR`      | no       | cwd     |
    /// | `TIMEOUT_SECS` | no       | `3600`  |
    pub fn from_config(stage: &str, config: &Config) -> Result<Self, WiringError> {
        let command = config
            .handler_setting(stage, "command")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| WiringError::MissingCommand {
                stage: stage.to_string(),
            })?;

        let mut handler = Self::new(stage, command);

        if let Some(dir) = config.handler_setting(stage, "workdir") {
            handler = handler.with_working_dir(dir);
        }

        if let Some(raw) = config.handler_setting(stage, "timeout_secs") {
            let secs: u64 = raw.trim().parse().map_err(|_| WiringError::InvalidSetting {
                stage: stage.to_string(),
                name: "timeout_secs",
                value: raw.to_string(),
            })?;
            handler = handler.with_timeout(Duration::from_secs(secs));
        }

        Ok(handler)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl JobHandler for CommandHandler {
    async fn process(&self, job: &Job, config: &Config) -> Result<(), HandlerError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env("JOB_ID", job.id.to_string())
            .env("JOB_CATEGORY", &job.category)
            .env("JOB_STATE", &job.state)
            .env("JOB_SOURCE_URL", &config.job_source_url);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let stdin = serde_json::to_vec(&job.payload)
            .map_err(|e| HandlerError::Failed(format!("cannot encode job payload: {e}")))?;

        tracing::debug!(stage = %self.stage, command = %self.command, "Running job command");

        let output = match subprocess::run(&mut cmd, stdin, self.timeout).await {
            Ok(output) => output,
            Err(SubprocessError::Io(e)) => return Err(HandlerError::Io(e)),
            Err(e @ SubprocessError::Timeout { .. }) => {
                return Err(HandlerError::Failed(e.to_string()));
            }
        };

        if !output.status.success() {
            return Err(HandlerError::Failed(format!(
                "command exited with code {}: {}",
                output.exit_code(),
                truncate(output.stderr.text.trim(), MAX_DETAIL_STDERR),
            )));
        }

        tracing::info!(
            stage = %self.stage,
            duration_ms = output.duration_ms,
            "Job command finished",
        );
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
