use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigError;

/// Default delay between scheduler passes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Default HTTP request timeout for job source calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const WORKERS_PREFIX: &str = "WORKERS_";
const HANDLER_PREFIX: &str = "HANDLER_";

/// Process-wide configuration, loaded once at startup and shared read-only
/// (behind an `Arc`) with every dispatcher and worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the job source API.
    pub job_source_url: String,
    /// Fixed delay between full scheduler passes.
    pub poll_interval: Duration,
    /// Request timeout for job source calls.
    pub request_timeout: Duration,
    /// Worker count per stage key, e.g. `audio_convert`.
    pub workers: BTreeMap<String, usize>,
    /// Handler settings, opaque to the engine. Keys are lowercased with the
    /// `HANDLER_` prefix stripped, e.g. `thermal_command`.
    pub settings: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `JOB_SOURCE_URL`            | --      |
    /// | `POLL_INTERVAL_SECS`        | `2`     |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`    |
    /// | `WORKERS_<STAGE>`           | `0`     |
    /// | `HANDLER_<STAGE>_<SETTING>` | --      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Build a configuration from an explicit set of variables.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut job_source_url = None;
        let mut poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        let mut request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        let mut workers = BTreeMap::new();
        let mut settings = BTreeMap::new();

        for (key, value) in vars {
            let key = key.into();
            let value = value.into();

            match key.as_str() {
                "JOB_SOURCE_URL" => {
                    let url = value.trim().trim_end_matches('/').to_string();
                    if !url.is_empty() {
                        job_source_url = Some(url);
                    }
                }
                "POLL_INTERVAL_SECS" => poll_interval_secs = parse_secs(&key, &value)?,
                "REQUEST_TIMEOUT_SECS" => request_timeout_secs = parse_secs(&key, &value)?,
                _ => {
                    if let Some(stage) = key.strip_prefix(WORKERS_PREFIX) {
                        if !stage.is_empty() {
                            workers.insert(stage.to_ascii_lowercase(), parse_var(&key, &value)?);
                        }
                    } else if let Some(name) = key.strip_prefix(HANDLER_PREFIX) {
                        if !name.is_empty() {
                            settings.insert(name.to_ascii_lowercase(), value);
                        }
                    }
                }
            }
        }

        Ok(Self {
            job_source_url: job_source_url.ok_or(ConfigError::Missing("JOB_SOURCE_URL"))?,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            workers,
            settings,
        })
    }

    /// Configured worker count for a stage; `0` when unset.
    pub fn worker_count(&self, stage: &str) -> usize {
        self.workers.get(stage).copied().unwrap_or(0)
    }

    /// Handler setting `<stage>_<name>`, if present.
    pub fn handler_setting(&self, stage: &str, name: &str) -> Option<&str> {
        self.settings
            .get(&format!("{stage}_{name}"))
            .map(String::as_str)
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Whole seconds, at least one.
fn parse_secs(var: &str, value: &str) -> Result<u64, ConfigError> {
    match parse_var(var, value)? {
        0 => Err(ConfigError::Invalid {
            var: var.to_string(),
            value: value.to_string(),
        }),
        secs => Ok(secs),
    }
}
