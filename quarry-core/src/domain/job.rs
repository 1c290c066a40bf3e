//! Job domain types

use serde::{Deserialize, Serialize};

/// One unit of work assigned by the broker.
///
/// Created by the broker and read-only on the runner side. The payload is
/// opaque to the orchestration loop and handed to the worker untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Broker-assigned ordinal, unique across the broker's job table
    #[serde(rename = "jobId")]
    pub job_id: i64,

    /// Key selecting which runner script handles this job
    #[serde(rename = "jobType")]
    pub job_type: String,

    /// Broker-defined payload, passed through to the worker
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Lifecycle state of a job on this runner.
///
/// `Completed`, `Canceled` and `Failed` are terminal; a registry entry is
/// removed exactly once, on the transition into one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Admitted into the registry, worker not yet driving
    Accepted,
    /// Worker task is running
    Executing,
    /// Worker finished and pushed its final trace update
    Completed,
    /// Terminated after the broker reported out-of-band cancellation
    Canceled,
    /// Worker signaled a fatal error
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Accepted => write!(f, "accepted"),
            JobState::Executing => write!(f, "executing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Canceled => write!(f, "canceled"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}
