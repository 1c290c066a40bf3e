//! Runner DTOs
//!
//! Data transfer objects for runner-related operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Broker-issued runner settings patch
///
/// Carried in poll responses under `set`. Known fields are applied to the
/// runner's settings; everything else lands in `extra` and is merged into
/// the local settings map, later patches layering over earlier ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerPatch {
    /// New concurrency limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// New poll cadence, in seconds
    #[serde(rename = "checkInterval", default, skip_serializing_if = "Option::is_none")]
    pub check_interval_secs: Option<u64>,

    /// Any other broker-issued settings, kept verbatim
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_collect_into_extra() {
        let patch: RunnerPatch = serde_json::from_str(
            r#"{"concurrency": 2, "checkInterval": 10, "timezone": "UTC"}"#,
        )
        .unwrap();
        assert_eq!(patch.concurrency, Some(2));
        assert_eq!(patch.check_interval_secs, Some(10));
        assert_eq!(patch.extra["timezone"], "UTC");
    }

    #[test]
    fn test_empty_patch() {
        let patch: RunnerPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.concurrency.is_none());
        assert!(patch.check_interval_secs.is_none());
        assert!(patch.extra.is_empty());
    }
}
