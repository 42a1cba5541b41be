//! REST client for the processing API's job endpoints.
//!
//! Wraps `GET /api/fileProcessing` using [`reqwest`] and exposes it as a
//! [`JobSource`] for the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use procd_core::{Config, Job, JobSource, JobSourceError};

/// Path of the "next job" endpoint, relative to the API base URL.
const NEXT_JOB_PATH: &str = "/api/fileProcessing";

/// Envelope keys the API may wrap the job record in.
const ENVELOPE_KEYS: [&str; 2] = ["recording", "job"];

/// HTTP client for the processing API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the processing API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body could not be interpreted as a job.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl From<ApiError> for JobSourceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) => JobSourceError::Unavailable(e.to_string()),
            ApiError::Api { status, body } => JobSourceError::Rejected { status, body },
            ApiError::Decode(msg) => JobSourceError::Malformed(msg),
        }
    }
}

impl ApiClient {
    /// Create a client whose requests time out after `timeout`.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://api:1080`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create a client from the process configuration.
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(config.job_source_url.clone(), config.request_timeout)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Ask the API for the next job of `category` waiting in `state`.
    ///
    /// `204 No Content`, an empty body or a `null` record all mean there is
    /// nothing to do.
    pub async fn fetch_next_job(&self, category: &str, state: &str) -> Result<Option<Job>, ApiError> {
        let response = self
            .client
            .get(format!("{}{NEXT_JOB_PATH}", self.api_url))
            .query(&[("type", category), ("state", state)])
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            tracing::trace!(category, state, "No pending job");
            return Ok(None);
        }

        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            tracing::trace!(category, state, "Empty job response");
            return Ok(None);
        }

        let job = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(e.to_string()))
            .and_then(|value: Value| decode_job(value, category, state));
        match &job {
            Ok(Some(job)) => tracing::debug!(category, state, job_id = job.id, "Claimed job"),
            Ok(None) => tracing::trace!(category, state, "No pending job"),
            Err(e) => tracing::warn!(
                category,
                state,
                error = %e,
                body_len = body.len(),
                "Job source returned an undecodable job"
            ),
        }
        job
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] containing
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl JobSource for ApiClient {
    async fn next_job(&self, category: &str, state: &str) -> Result<Option<Job>, JobSourceError> {
        Ok(self.fetch_next_job(category, state).await?)
    }
}

/// Turn a response body into a [`Job`].
///
/// Accepts the record wrapped in a `recording` or `job` envelope, or bare.
/// The record must carry an integer `id`; category and state are read from
/// `type`/`category` and `processingState`/`state`, falling back to the
/// requested values.
pub fn decode_job(body: Value, category: &str, state: &str) -> Result<Option<Job>, ApiError> {
    let record = match body {
        Value::Null => return Ok(None),
        Value::Object(mut map) => {
            match ENVELOPE_KEYS.iter().find_map(|key| map.remove(*key)) {
                Some(inner) => inner,
                None => Value::Object(map),
            }
        }
        other => {
            return Err(ApiError::Decode(format!(
                "expected a JSON object, got {other}"
            )))
        }
    };

    let fields = match &record {
        Value::Null => return Ok(None),
        Value::Object(fields) => fields,
        other => {
            return Err(ApiError::Decode(format!(
                "expected a job record, got {other}"
            )))
        }
    };

    let id = fields
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Decode("job record has no integer id".to_string()))?;

    let string_field = |names: [&str; 2], fallback: &str| {
        names
            .iter()
            .find_map(|name| fields.get(*name).and_then(Value::as_str))
            .unwrap_or(fallback)
            .to_string()
    };
    let job_category = string_field(["type", "category"], category);
    let job_state = string_field(["processingState", "state"], state);

    Ok(Some(Job::new(id, job_category, job_state, record)))
}
