//! Trace buffer service
//!
//! Manages in-memory trace collection for job execution. The buffer is
//! written to by the worker's output readers and periodically drained for
//! forwarding to the broker. Entry order is preserved through drain and
//! requeue, which is what keeps a job's trace ordered end to end.

use std::sync::{Arc, Mutex};

use quarry_core::domain::trace::TraceEntry;

/// Service for managing a job's trace buffer
pub trait TraceBuffer: Send + Sync {
    /// Appends a trace entry to the buffer
    fn push(&self, entry: TraceEntry);

    /// Drains all buffered entries, oldest first
    fn drain(&self) -> Vec<TraceEntry>;

    /// Puts previously drained entries back at the front of the buffer
    ///
    /// Used when forwarding an update fails: the entries go back ahead of
    /// anything buffered since, so the retried update keeps the original
    /// order.
    fn requeue(&self, entries: Vec<TraceEntry>);
}

/// In-memory implementation of TraceBuffer
///
/// Uses Arc<Mutex<Vec<TraceEntry>>> for thread-safe access across tasks.
#[derive(Clone)]
pub struct InMemoryTraceBuffer {
    buffer: Arc<Mutex<Vec<TraceEntry>>>,
}

impl InMemoryTraceBuffer {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for InMemoryTraceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBuffer for InMemoryTraceBuffer {
    fn push(&self, entry: TraceEntry) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push(entry);
    }

    fn drain(&self) -> Vec<TraceEntry> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.drain(..).collect()
    }

    fn requeue(&self, mut entries: Vec<TraceEntry>) {
        let mut buffer = self.buffer.lock().unwrap();
        entries.append(&mut buffer);
        *buffer = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_push_order() {
        let buffer = InMemoryTraceBuffer::new();
        buffer.push(TraceEntry::info("a"));
        buffer.push(TraceEntry::info("b"));
        buffer.push(TraceEntry::info("c"));

        let drained = buffer.drain();
        let messages: Vec<_> = drained.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_requeue_goes_ahead_of_newer_entries() {
        let buffer = InMemoryTraceBuffer::new();
        buffer.push(TraceEntry::info("a"));
        buffer.push(TraceEntry::info("b"));

        let drained = buffer.drain();
        buffer.push(TraceEntry::info("c"));
        buffer.requeue(drained);

        let messages: Vec<_> = buffer
            .drain()
            .iter()
            .map(|e| e.message.clone())
            .collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }
}
