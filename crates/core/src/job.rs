//! Job and outcome types shared by the dispatcher, the worker pool and the
//! collaborators behind the ports.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// A unit of work handed out by the job source.
///
/// The core never mutates a job; state transitions belong to the handler
/// and the job source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub category: String,
    pub state: String,
    /// Full record as supplied by the job source.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(
        id: JobId,
        category: impl Into<String>,
        state: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            category: category.into(),
            state: state.into(),
            payload,
        }
    }
}

/// Terminal result of one submitted unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { detail: String },
}

impl Outcome {
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure {
            detail: detail.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}
