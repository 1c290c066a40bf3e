//! Job poller
//!
//! Drives job acquisition on a fixed cadence: at most one poll request in
//! flight at any time, no request at all while the registry is at the
//! concurrency limit, and broker settings patches applied before any job
//! from the same response is dispatched.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use quarry_client::BrokerClient;
use quarry_core::domain::job::{Job, JobState};
use quarry_core::domain::trace::TraceEntry;
use quarry_core::dto::job::TraceUpdate;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::ConfigManager;
use crate::service::{JobRegistry, ScriptResolver};
use crate::worker::{JobWorker, TerminationReason, WorkerEvent};

/// Poller that continuously acquires and launches jobs
#[derive(Clone)]
pub struct JobPoller {
    config: Arc<ConfigManager>,
    client: Arc<BrokerClient>,
    registry: Arc<JobRegistry>,
    scripts: Arc<dyn ScriptResolver>,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag when the poll attempt settles, on every path
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: Arc<ConfigManager>,
        client: Arc<BrokerClient>,
        registry: Arc<JobRegistry>,
        scripts: Arc<dyn ScriptResolver>,
    ) -> Self {
        Self {
            config,
            client,
            registry,
            scripts,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the polling loop
    ///
    /// The cadence is re-read from the configuration on every tick so
    /// broker patches take effect on the next interval. The loop itself
    /// never fails; individual poll attempts log and swallow their errors.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting job poller (interval: {:?}, concurrency: {})",
            self.config.check_interval(),
            self.config.concurrency()
        );

        loop {
            time::sleep(self.config.check_interval()).await;

            if self.in_flight.swap(true, Ordering::SeqCst) {
                debug!("Previous poll still in flight, skipping tick");
                continue;
            }

            let poller = self.clone();
            tokio::spawn(async move {
                let _guard = InFlightGuard(Arc::clone(&poller.in_flight));
                if let Err(e) = poller.poll_and_execute().await {
                    error!("Error during poll cycle: {:#}", e);
                }
            });
        }
    }

    /// Performs a single poll-and-execute attempt
    async fn poll_and_execute(&self) -> Result<()> {
        if self.registry.len() >= self.config.concurrency() {
            debug!(
                "Concurrency limit reached ({} running), skipping poll",
                self.registry.len()
            );
            return Ok(());
        }

        let runner_id = self.config.runner_id();
        let response = self
            .client
            .request_job(&runner_id)
            .await
            .context("Failed to request job")?;

        let Some(response) = response else {
            debug!("No work available");
            return Ok(());
        };

        // Settings from the same response govern the job it carries
        if let Some(patch) = response.set {
            self.config.patch(patch);
        }

        let Some(job) = response.job else {
            return Ok(());
        };

        info!("Assigned job [type={}, id={}]", job.job_type, job.job_id);

        let entry = match self.scripts.resolve_dynamic(&job.job_type).await {
            Ok(Some(entry)) => entry,
            Ok(None) => self.scripts.bundled_entry(&job.job_type),
            Err(e) => {
                failed_job(
                    &self.client,
                    &job,
                    &format!("Failed to install runner script: {:#}", e),
                )
                .await;
                return Ok(());
            }
        };

        self.execute_job(job, entry);
        Ok(())
    }

    /// Admits a job into the registry and launches its worker
    fn execute_job(&self, job: Job, entry: PathBuf) {
        let (worker, handle, events) =
            JobWorker::new(job.clone(), entry, self.config.trace_flush_interval());

        self.registry.admit(job.job_id, handle);
        worker.start();
        self.registry.mark_executing(job.job_id);

        self.spawn_event_loop(job, events);
    }

    /// Consumes one worker's events until its terminal signal
    ///
    /// Exactly one registry removal happens here, on `Error` or `End`.
    fn spawn_event_loop(
        &self,
        job: Job,
        mut events: tokio::sync::mpsc::Receiver<WorkerEvent>,
    ) {
        let client = Arc::clone(&self.client);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let mut termination_requested = false;
            let mut settled = false;

            while let Some(event) = events.recv().await {
                match event {
                    WorkerEvent::Update { update, ack } => {
                        let request = TraceUpdate {
                            job_id: job.job_id,
                            trace: update.trace,
                            done: update.done.then_some(true),
                            failed_reason: update.failed_reason,
                            duration_ms: update.duration_ms,
                        };

                        match client.update_job_trace(&request).await {
                            Ok(response) => {
                                if response.canceled && !termination_requested {
                                    info!(
                                        "Job canceled by broker [type={}, id={}]",
                                        job.job_type, job.job_id
                                    );
                                    registry.terminate(job.job_id, TerminationReason::Canceled);
                                    termination_requested = true;
                                }
                                let _ = ack.send(Ok(()));
                            }
                            Err(e) => {
                                // The worker owns retrying; it just needs to know
                                let _ = ack.send(Err(e.into()));
                            }
                        }
                    }
                    WorkerEvent::Error(e) => {
                        failed_job(&client, &job, &format!("{:#}", e)).await;
                        registry.complete(job.job_id, JobState::Failed);
                        settled = true;
                        break;
                    }
                    WorkerEvent::End => {
                        let outcome = if termination_requested {
                            JobState::Canceled
                        } else {
                            JobState::Completed
                        };
                        registry.complete(job.job_id, outcome);
                        settled = true;
                        break;
                    }
                }
            }

            // A worker that dies without a terminal event must not leak
            // its registry entry.
            if !settled {
                warn!(
                    "Worker event stream ended without terminal event [type={}, id={}]",
                    job.job_type, job.job_id
                );
                registry.complete(job.job_id, JobState::Failed);
            }
        });
    }
}

/// Reports a job as failed to the broker, best-effort
///
/// Used for failures that happen outside the worker's own reporting: a
/// script that could not be installed, or a worker that died without
/// pushing its final update.
async fn failed_job(client: &BrokerClient, job: &Job, detail: &str) {
    error!(
        "job failed [type={}, id={}]: {}",
        job.job_type, job.job_id, detail
    );

    let update = TraceUpdate {
        job_id: job.job_id,
        trace: vec![TraceEntry::error(format!(
            "job failed [type={}] {}",
            job.job_type, detail
        ))],
        done: Some(true),
        failed_reason: Some("Internal Error".to_string()),
        duration_ms: None,
    };

    if let Err(e) = client.update_job_trace(&update).await {
        warn!(
            "Failed to report job failure [id={}]: {:#}",
            job.job_id, e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_clears_on_drop() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _guard = InFlightGuard(Arc::clone(&flag));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
