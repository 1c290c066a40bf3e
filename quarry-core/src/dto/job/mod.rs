//! Job DTOs for broker communication

use serde::{Deserialize, Serialize};

use crate::domain::job::Job;
use crate::domain::trace::TraceEntry;
use crate::dto::runner::RunnerPatch;

/// Response to a poll request
///
/// Any combination is valid: a config patch only, a job only, both, or
/// neither (the broker answers `204 No Content` when it has nothing at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequestResponse {
    /// Runner settings to layer over the local configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<RunnerPatch>,

    /// The assigned job, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

/// Incremental or final trace report for one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceUpdate {
    #[serde(rename = "jobId")]
    pub job_id: i64,

    /// Trace entries accumulated since the previous update, in emission order
    pub trace: Vec<TraceEntry>,

    /// Set on the last update a worker sends for its job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,

    /// Human-readable failure classification, present only on failed jobs
    #[serde(rename = "failedReason", default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// Wall-clock job duration, reported with the final update
    #[serde(rename = "durationMs", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Broker acknowledgement of a trace update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceUpdateResponse {
    /// The job was canceled out-of-band; the runner should terminate it
    #[serde(default)]
    pub canceled: bool,
}
