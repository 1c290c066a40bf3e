//! Running-job registry
//!
//! Maps job ids to their worker handles. The registry is the admission
//! gate for the poll loop (its size against the concurrency limit) and the
//! single place job lifecycle state lives: entries are added only by the
//! poll loop and removed exactly once, by the job's terminal-event handler.

use std::collections::HashMap;
use std::sync::Mutex;

use quarry_core::domain::job::JobState;
use tracing::{debug, warn};

use crate::worker::{TerminationReason, WorkerHandle};

struct RegisteredJob {
    state: JobState,
    handle: WorkerHandle,
}

/// Registry of currently running jobs
pub struct JobRegistry {
    jobs: Mutex<HashMap<i64, RegisteredJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of jobs currently admitted
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Admits a job into the registry, bound to its worker handle
    ///
    /// The entry starts in `Accepted`; the poll loop marks it `Executing`
    /// once the worker has been started.
    pub fn admit(&self, job_id: i64, handle: WorkerHandle) {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs
            .insert(
                job_id,
                RegisteredJob {
                    state: JobState::Accepted,
                    handle,
                },
            )
            .is_some()
        {
            // The broker assigns each job id once; a duplicate means the old
            // entry leaked and the fresh handle wins.
            warn!("Replaced existing registry entry for job {}", job_id);
        }
    }

    /// Transitions an accepted job to `Executing`
    pub fn mark_executing(&self, job_id: i64) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(entry) = jobs.get_mut(&job_id) {
            if entry.state == JobState::Accepted {
                entry.state = JobState::Executing;
            } else {
                warn!(
                    "Ignored executing transition for job {} in state {}",
                    job_id, entry.state
                );
            }
        }
    }

    /// Moves a job into a terminal state and removes its entry
    ///
    /// Returns whether the entry was still live. A second terminal event
    /// for the same job finds nothing to remove and is inert, which is what
    /// makes cleanup exactly-once.
    pub fn complete(&self, job_id: i64, outcome: JobState) -> bool {
        debug_assert!(outcome.is_terminal());

        let mut jobs = self.jobs.lock().unwrap();
        match jobs.remove(&job_id) {
            Some(entry) => {
                debug!(
                    "Job {} finished: {} -> {} ({} running)",
                    job_id,
                    entry.state,
                    outcome,
                    jobs.len()
                );
                true
            }
            None => {
                warn!("No registry entry for job {} at {}", job_id, outcome);
                false
            }
        }
    }

    /// Requests termination of a running job's worker
    ///
    /// Returns whether a live entry was found. The worker stops on its own
    /// schedule and still reports through its terminal event; the entry is
    /// not removed here.
    pub fn terminate(&self, job_id: i64, reason: TerminationReason) -> bool {
        let jobs = self.jobs.lock().unwrap();
        match jobs.get(&job_id) {
            Some(entry) => {
                entry.handle.terminate(reason);
                true
            }
            None => {
                warn!("Termination requested for unknown job {}", job_id);
                false
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_handle(job_id: i64) -> (WorkerHandle, mpsc::Receiver<TerminationReason>) {
        let (termination, termination_rx) = mpsc::channel(1);
        (
            WorkerHandle {
                job_id,
                job_type: "test".to_string(),
                termination,
            },
            termination_rx,
        )
    }

    #[test]
    fn test_admission_tracks_size() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());

        let (handle, _rx) = test_handle(1);
        registry.admit(1, handle);
        let (handle, _rx2) = test_handle(2);
        registry.admit(2, handle);

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_is_exactly_once() {
        let registry = JobRegistry::new();
        let (handle, _rx) = test_handle(7);
        registry.admit(7, handle);
        registry.mark_executing(7);

        assert!(registry.complete(7, JobState::Completed));
        assert_eq!(registry.len(), 0);

        // A second terminal event for the same job finds nothing
        assert!(!registry.complete(7, JobState::Failed));
    }

    #[test]
    fn test_terminate_reaches_the_handle() {
        let registry = JobRegistry::new();
        let (handle, mut rx) = test_handle(3);
        registry.admit(3, handle);

        assert!(registry.terminate(3, TerminationReason::Canceled));
        assert!(matches!(rx.try_recv(), Ok(TerminationReason::Canceled)));

        // Entry stays until the terminal event arrives
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_terminate_unknown_job() {
        let registry = JobRegistry::new();
        assert!(!registry.terminate(99, TerminationReason::Canceled));
    }
}
