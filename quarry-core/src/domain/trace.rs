//! Trace domain types

use serde::{Deserialize, Serialize};

/// A single entry in a job's trace stream
///
/// Ordering within one job's trace is significant and preserved end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: TraceLevel,
    pub message: String,
}

impl TraceEntry {
    pub fn new(level: TraceLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(TraceLevel::Error, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_level() {
        assert_eq!(TraceEntry::info("up").level, TraceLevel::Info);
        assert_eq!(TraceEntry::error("down").level, TraceLevel::Error);
    }
}
