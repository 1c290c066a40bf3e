//! Worker execution layer
//!
//! One worker per accepted job, isolated in its own child process. The
//! orchestration loop only ever sees the event contract defined here.

mod executor;

pub use executor::{JobWorker, TerminationReason, WorkerEvent, WorkerHandle, WorkerUpdate};
