//! Job worker executor
//!
//! Runs one job in an isolated child process and translates its lifetime
//! into events for the orchestration loop: incremental `Update`s carrying
//! drained trace entries, then exactly one terminal signal (`End` after the
//! final trace report, or `Error` if the executor itself failed).
//!
//! Forwarding outcomes come back through each update's ack channel; a
//! failed ack requeues the drained entries so the next flush retries them
//! in order. That retry policy lives here, not in the orchestration loop.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use quarry_core::domain::job::Job;
use quarry_core::domain::trace::{TraceEntry, TraceLevel};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, warn};

use crate::service::{InMemoryTraceBuffer, TraceBuffer};

const FINAL_REPORT_ATTEMPTS: u32 = 3;
const FINAL_REPORT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Lifecycle events a worker emits to the orchestration loop
pub enum WorkerEvent {
    /// Incremental or final state; `ack` reports whether forwarding the
    /// update to the broker succeeded
    Update {
        update: WorkerUpdate,
        ack: oneshot::Sender<anyhow::Result<()>>,
    },
    /// The executor itself failed; terminal, nothing was or will be
    /// reported by the worker
    Error(anyhow::Error),
    /// Normal terminal signal; the final trace update has already been
    /// pushed through the update channel
    End,
}

/// One batch of worker state to forward to the broker
pub struct WorkerUpdate {
    /// Trace entries in emission order
    pub trace: Vec<TraceEntry>,
    /// Set on the worker's last update
    pub done: bool,
    pub failed_reason: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Why a worker is being told to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The broker reported the job canceled out-of-band
    Canceled,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Canceled => write!(f, "canceled"),
        }
    }
}

/// Registry-owned handle to one executing job
pub struct WorkerHandle {
    pub(crate) job_id: i64,
    pub(crate) job_type: String,
    pub(crate) termination: mpsc::Sender<TerminationReason>,
}

impl WorkerHandle {
    /// Asks the worker to stop
    ///
    /// The worker kills its child process and still reports through its
    /// terminal event; how promptly it stops is its own concern.
    pub fn terminate(&self, reason: TerminationReason) {
        if self.termination.try_send(reason).is_err() {
            debug!(
                "Termination for job {} [type={}] not delivered, worker already stopping",
                self.job_id, self.job_type
            );
        }
    }
}

/// Executor for one job, driving a child process
pub struct JobWorker {
    job: Job,
    entry: PathBuf,
    flush_interval: Duration,
    events: mpsc::Sender<WorkerEvent>,
    termination: mpsc::Receiver<TerminationReason>,
}

impl JobWorker {
    /// Prepares a worker for a job with a resolved script entry point
    ///
    /// Returns the worker (start it with [`JobWorker::start`]), the handle
    /// the registry owns, and the event stream for the orchestration loop.
    pub fn new(
        job: Job,
        entry: PathBuf,
        flush_interval: Duration,
    ) -> (Self, WorkerHandle, mpsc::Receiver<WorkerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (termination_tx, termination_rx) = mpsc::channel(1);

        let handle = WorkerHandle {
            job_id: job.job_id,
            job_type: job.job_type.clone(),
            termination: termination_tx,
        };

        let worker = Self {
            job,
            entry,
            flush_interval,
            events: events_tx,
            termination: termination_rx,
        };

        (worker, handle, events_rx)
    }

    /// Begins execution in its own task; never blocks the caller
    pub fn start(self) {
        tokio::spawn(self.drive());
    }

    async fn drive(mut self) {
        let started = Instant::now();
        let buffer: Arc<dyn TraceBuffer> = Arc::new(InMemoryTraceBuffer::new());

        buffer.push(TraceEntry {
            timestamp: chrono::Utc::now(),
            level: TraceLevel::Info,
            message: format!(
                "starting worker [type={}, id={}]",
                self.job.job_type, self.job.job_id
            ),
        });

        let mut child = match Command::new(&self.entry)
            .env("QUARRY_JOB_ID", self.job.job_id.to_string())
            .env("QUARRY_JOB_TYPE", &self.job.job_type)
            .env("QUARRY_JOB_PAYLOAD", self.job.payload.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let error = anyhow!(e).context(format!(
                    "Failed to spawn worker process {}",
                    self.entry.display()
                ));
                let _ = self.events.send(WorkerEvent::Error(error)).await;
                return;
            }
        };

        let stdout_reader = child
            .stdout
            .take()
            .map(|out| spawn_line_reader(out, TraceLevel::Info, Arc::clone(&buffer)));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| spawn_line_reader(err, TraceLevel::Error, Arc::clone(&buffer)));

        let mut flush = time::interval(self.flush_interval);
        let mut canceled: Option<TerminationReason> = None;

        let status = loop {
            tokio::select! {
                // Biased so a queued termination request is always seen
                // before the next flush fires.
                biased;
                status = child.wait() => break status,
                Some(reason) = self.termination.recv(), if canceled.is_none() => {
                    buffer.push(TraceEntry {
                        timestamp: chrono::Utc::now(),
                        level: TraceLevel::Info,
                        message: format!("termination requested: {}", reason),
                    });
                    if let Err(e) = child.start_kill() {
                        buffer.push(TraceEntry {
                            timestamp: chrono::Utc::now(),
                            level: TraceLevel::Error,
                            message: format!("failed to kill worker process: {}", e),
                        });
                    }
                    canceled = Some(reason);
                }
                // No incremental updates once termination is in progress;
                // whatever is buffered goes out with the final report.
                _ = flush.tick(), if canceled.is_none() => {
                    flush_trace(&buffer, &self.events).await;
                }
            }
        };

        if let Some(reader) = stdout_reader {
            let _ = reader.await;
        }
        if let Some(reader) = stderr_reader {
            let _ = reader.await;
        }

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                let error = anyhow!(e).context(format!(
                    "Failed waiting on worker process [type={}, id={}]",
                    self.job.job_type, self.job.job_id
                ));
                let _ = self.events.send(WorkerEvent::Error(error)).await;
                return;
            }
        };

        let failed_reason = if canceled.is_some() || status.success() {
            None
        } else {
            Some(format!("worker exited with {}", status))
        };

        buffer.push(match (canceled, &failed_reason) {
            (Some(reason), _) => TraceEntry {
                timestamp: chrono::Utc::now(),
                level: TraceLevel::Info,
                message: format!("worker terminated: {}", reason),
            },
            (None, Some(reason)) => TraceEntry {
                timestamp: chrono::Utc::now(),
                level: TraceLevel::Error,
                message: reason.clone(),
            },
            (None, None) => TraceEntry {
                timestamp: chrono::Utc::now(),
                level: TraceLevel::Info,
                message: "worker finished".to_string(),
            },
        });

        let duration_ms = started.elapsed().as_millis() as u64;

        for attempt in 1..=FINAL_REPORT_ATTEMPTS {
            let trace = buffer.drain();
            let update = WorkerUpdate {
                trace: trace.clone(),
                done: true,
                failed_reason: failed_reason.clone(),
                duration_ms: Some(duration_ms),
            };
            match send_update(&self.events, update).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "Final trace update failed [id={}] (attempt {}/{}): {:#}",
                        self.job.job_id, attempt, FINAL_REPORT_ATTEMPTS, e
                    );
                    buffer.requeue(trace);
                    if attempt < FINAL_REPORT_ATTEMPTS {
                        time::sleep(FINAL_REPORT_RETRY_DELAY).await;
                    }
                }
            }
        }

        let _ = self.events.send(WorkerEvent::End).await;
    }
}

/// Drains the buffer and forwards one incremental update
///
/// On a failed ack the entries are requeued at the buffer front so the
/// next flush retries them ahead of anything emitted since.
async fn flush_trace(buffer: &Arc<dyn TraceBuffer>, events: &mpsc::Sender<WorkerEvent>) {
    let trace = buffer.drain();
    if trace.is_empty() {
        return;
    }

    let update = WorkerUpdate {
        trace: trace.clone(),
        done: false,
        failed_reason: None,
        duration_ms: None,
    };

    if let Err(e) = send_update(events, update).await {
        debug!(
            "Trace update not delivered, requeueing {} entries: {:#}",
            trace.len(),
            e
        );
        buffer.requeue(trace);
    }
}

/// Sends one update event and waits for the forwarding outcome
async fn send_update(
    events: &mpsc::Sender<WorkerEvent>,
    update: WorkerUpdate,
) -> anyhow::Result<()> {
    let (ack, ack_rx) = oneshot::channel();
    events
        .send(WorkerEvent::Update { update, ack })
        .await
        .map_err(|_| anyhow!("event channel closed"))?;
    ack_rx.await.map_err(|_| anyhow!("update ack dropped"))?
}

/// Converts one output stream of the child process into trace entries
fn spawn_line_reader<R>(
    reader: R,
    level: TraceLevel,
    buffer: Arc<dyn TraceBuffer>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => buffer.push(TraceEntry {
                    timestamp: chrono::Utc::now(),
                    level,
                    message: line,
                }),
                Ok(None) => break,
                Err(e) => {
                    buffer.push(TraceEntry {
                        timestamp: chrono::Utc::now(),
                        level: TraceLevel::Warning,
                        message: format!("worker output unreadable: {}", e),
                    });
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("run.sh");
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn test_job() -> Job {
        Job {
            job_id: 11,
            job_type: "bundle".to_string(),
            payload: serde_json::json!({"artifact": "a.tar"}),
        }
    }

    /// Acks every update and collects the full event sequence until End
    /// or Error.
    async fn collect_events(
        mut events: mpsc::Receiver<WorkerEvent>,
    ) -> (Vec<WorkerUpdate>, Option<anyhow::Error>) {
        let mut updates = Vec::new();
        let mut error = None;
        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Update { update, ack } => {
                    let _ = ack.send(Ok(()));
                    updates.push(update);
                }
                WorkerEvent::Error(e) => {
                    error = Some(e);
                    break;
                }
                WorkerEvent::End => break,
            }
        }
        (updates, error)
    }

    #[tokio::test]
    async fn test_worker_streams_output_in_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_script(dir.path(), "#!/bin/sh\necho one\necho two\n");

        let (worker, _handle, events) =
            JobWorker::new(test_job(), entry, Duration::from_millis(20));
        worker.start();

        let (updates, error) = tokio::time::timeout(
            Duration::from_secs(10),
            collect_events(events),
        )
        .await
        .unwrap();

        assert!(error.is_none());
        let last = updates.last().unwrap();
        assert!(last.done);
        assert!(last.failed_reason.is_none());
        assert!(last.duration_ms.is_some());

        let messages: Vec<String> = updates
            .iter()
            .flat_map(|u| u.trace.iter().map(|e| e.message.clone()))
            .collect();
        let one = messages.iter().position(|m| m == "one").unwrap();
        let two = messages.iter().position(|m| m == "two").unwrap();
        assert!(one < two);
    }

    #[tokio::test]
    async fn test_worker_reports_nonzero_exit_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_script(dir.path(), "#!/bin/sh\necho broken >&2\nexit 3\n");

        let (worker, _handle, events) =
            JobWorker::new(test_job(), entry, Duration::from_millis(20));
        worker.start();

        let (updates, error) = tokio::time::timeout(
            Duration::from_secs(10),
            collect_events(events),
        )
        .await
        .unwrap();

        assert!(error.is_none());
        let last = updates.last().unwrap();
        assert!(last.done);
        assert!(last.failed_reason.as_deref().unwrap().contains("exit"));
    }

    #[tokio::test]
    async fn test_worker_termination_ends_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_script(dir.path(), "#!/bin/sh\necho waiting\nsleep 30\n");

        let (worker, handle, mut events) =
            JobWorker::new(test_job(), entry, Duration::from_millis(20));
        worker.start();

        // Wait for the first update, then cancel like the broker would
        let mut terminated = false;
        let mut saw_end = false;
        let run = async {
            while let Some(event) = events.recv().await {
                match event {
                    WorkerEvent::Update { update, ack } => {
                        let _ = ack.send(Ok(()));
                        if !terminated {
                            handle.terminate(TerminationReason::Canceled);
                            terminated = true;
                        }
                        if update.done {
                            assert!(update.failed_reason.is_none());
                        }
                    }
                    WorkerEvent::Error(e) => panic!("unexpected error: {e:#}"),
                    WorkerEvent::End => {
                        saw_end = true;
                        break;
                    }
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(10), run).await.unwrap();
        assert!(terminated);
        assert!(saw_end);
    }

    #[tokio::test]
    async fn test_missing_entry_point_is_an_error_event() {
        let (worker, _handle, events) = JobWorker::new(
            test_job(),
            PathBuf::from("/nonexistent/entry"),
            Duration::from_millis(20),
        );
        worker.start();

        let (updates, error) = tokio::time::timeout(
            Duration::from_secs(10),
            collect_events(events),
        )
        .await
        .unwrap();

        assert!(updates.is_empty());
        assert!(error.unwrap().to_string().contains("spawn"));
    }
}
