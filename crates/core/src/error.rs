use crate::types::JobId;

/// Errors raised by a [`JobSource`](crate::ports::JobSource) while looking
/// up the next job.
#[derive(Debug, thiserror::Error)]
pub enum JobSourceError {
    #[error("Job source unavailable: {0}")]
    Unavailable(String),

    #[error("Job source rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed job: {0}")]
    Malformed(String),
}

/// Errors returned by a [`JobHandler`](crate::ports::JobHandler).
///
/// Whatever the variant, the dispatcher only ever sees the `Display` text
/// as the failure detail of the job's [`Outcome`](crate::job::Outcome).
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    JobSource(#[from] JobSourceError),
}

/// Errors surfaced by a single dispatcher tick.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Fetching next {category}.{state} job failed: {source}")]
    Fetch {
        category: String,
        state: String,
        #[source]
        source: JobSourceError,
    },

    #[error("Job source handed out job {job_id} for {category}.{state} while it is still in flight")]
    AlreadyInFlight {
        category: String,
        state: String,
        job_id: JobId,
    },
}

/// Errors while loading [`Config`](crate::config::Config).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_detail_is_display_text() {
        let err = HandlerError::Failed("classifier exited with 3".to_string());
        assert_eq!(err.to_string(), "classifier exited with 3");
    }

    #[test]
    fn handler_error_wraps_job_source_transparently() {
        let err = HandlerError::from(JobSourceError::Unavailable("timeout".to_string()));
        assert_eq!(err.to_string(), "Job source unavailable: timeout");
    }

    #[test]
    fn fetch_error_keeps_source() {
        let err = DispatchError::Fetch {
            category: "audio".to_string(),
            state: "toMp3".to_string(),
            source: JobSourceError::Unavailable("connection refused".to_string()),
        };
        assert!(err.to_string().starts_with("Fetching next audio.toMp3 job failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
