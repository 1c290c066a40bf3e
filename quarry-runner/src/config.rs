//! Runner configuration
//!
//! Defines all configurable parameters for the runner including polling
//! cadence, concurrency, script directories, and broker connection
//! settings. Settings are loaded from the environment at startup and may
//! be patched at runtime by the broker through poll responses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use quarry_core::dto::runner::RunnerPatch;
use tracing::info;

/// Runner settings
///
/// All intervals are configurable to allow tuning for different deployment
/// scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Broker base URL (e.g., "http://localhost:8080")
    pub broker_url: String,

    /// Maximum number of jobs executing at once
    pub concurrency: usize,

    /// How often to poll the broker for new jobs
    pub check_interval: Duration,

    /// How often a worker flushes buffered trace entries to the broker
    pub trace_flush_interval: Duration,

    /// Port the liveness endpoint listens on
    pub health_port: u16,

    /// Directory dynamically installed runner scripts are written under
    pub script_install_dir: PathBuf,

    /// Directory holding the statically bundled runner scripts
    pub bundled_script_dir: PathBuf,

    /// Broker-issued settings with no dedicated field, kept verbatim
    pub extra: HashMap<String, serde_json::Value>,
}

impl RunnerSettings {
    /// Creates settings with defaults
    pub fn new(runner_id: String, broker_url: String) -> Self {
        Self {
            runner_id,
            broker_url,
            concurrency: 1,
            check_interval: Duration::from_secs(5),
            trace_flush_interval: Duration::from_secs(5),
            health_port: 3333,
            script_install_dir: PathBuf::from("scripts/installed"),
            bundled_script_dir: PathBuf::from("scripts/bundled"),
            extra: HashMap::new(),
        }
    }

    /// Creates settings from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (required)
    /// - BROKER_URL (required)
    /// - CONCURRENCY (optional, default: 1)
    /// - CHECK_INTERVAL (optional, seconds, default: 5)
    /// - TRACE_FLUSH_INTERVAL (optional, seconds, default: 5)
    /// - HEALTH_PORT (optional, default: 3333)
    /// - SCRIPT_INSTALL_DIR (optional, default: scripts/installed)
    /// - BUNDLED_SCRIPT_DIR (optional, default: scripts/bundled)
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let broker_url = std::env::var("BROKER_URL")
            .map_err(|_| anyhow::anyhow!("BROKER_URL environment variable not set"))?;

        let mut settings = Self::new(runner_id, broker_url);

        if let Some(concurrency) = std::env::var("CONCURRENCY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            settings.concurrency = concurrency;
        }

        if let Some(secs) = std::env::var("CHECK_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            settings.check_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = std::env::var("TRACE_FLUSH_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            settings.trace_flush_interval = Duration::from_secs(secs);
        }

        if let Some(port) = std::env::var("HEALTH_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            settings.health_port = port;
        }

        if let Ok(dir) = std::env::var("SCRIPT_INSTALL_DIR") {
            settings.script_install_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("BUNDLED_SCRIPT_DIR") {
            settings.bundled_script_dir = PathBuf::from(dir);
        }

        Ok(settings)
    }

    /// Validates the settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.broker_url.is_empty() {
            anyhow::bail!("broker_url cannot be empty");
        }

        if !self.broker_url.starts_with("http://") && !self.broker_url.starts_with("https://") {
            anyhow::bail!("broker_url must start with http:// or https://");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }

        if self.check_interval.as_secs() == 0 {
            anyhow::bail!("check_interval must be greater than 0");
        }

        if self.trace_flush_interval.as_secs() == 0 {
            anyhow::bail!("trace_flush_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

/// Owner of the live runner settings
///
/// The poll loop reads intervals and limits fresh on every use, and applies
/// broker patches as they arrive; later patches layer over earlier ones
/// without disturbing unrelated fields.
pub struct ConfigManager {
    settings: RwLock<RunnerSettings>,
}

impl ConfigManager {
    pub fn new(settings: RunnerSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn runner_id(&self) -> String {
        self.settings.read().unwrap().runner_id.clone()
    }

    pub fn broker_url(&self) -> String {
        self.settings.read().unwrap().broker_url.clone()
    }

    pub fn concurrency(&self) -> usize {
        self.settings.read().unwrap().concurrency
    }

    pub fn check_interval(&self) -> Duration {
        self.settings.read().unwrap().check_interval
    }

    pub fn trace_flush_interval(&self) -> Duration {
        self.settings.read().unwrap().trace_flush_interval
    }

    pub fn health_port(&self) -> u16 {
        self.settings.read().unwrap().health_port
    }

    pub fn script_install_dir(&self) -> PathBuf {
        self.settings.read().unwrap().script_install_dir.clone()
    }

    pub fn bundled_script_dir(&self) -> PathBuf {
        self.settings.read().unwrap().bundled_script_dir.clone()
    }

    /// Returns a point-in-time copy of the full settings
    pub fn snapshot(&self) -> RunnerSettings {
        self.settings.read().unwrap().clone()
    }

    /// Applies a broker-issued settings patch
    ///
    /// Known fields overwrite their current values; unknown fields merge
    /// into the `extra` map, keyed patches layering over earlier ones.
    pub fn patch(&self, patch: RunnerPatch) {
        let mut settings = self.settings.write().unwrap();

        if let Some(concurrency) = patch.concurrency {
            info!("Broker patched concurrency: {}", concurrency);
            settings.concurrency = concurrency;
        }

        if let Some(secs) = patch.check_interval_secs {
            info!("Broker patched check interval: {}s", secs);
            settings.check_interval = Duration::from_secs(secs);
        }

        for (key, value) in patch.extra {
            settings.extra.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RunnerSettings::default();
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.check_interval, Duration::from_secs(5));
        assert_eq!(settings.health_port, 3333);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = RunnerSettings::default();

        // Valid settings should pass
        assert!(settings.validate().is_ok());

        // Empty runner_id should fail
        settings.runner_id = String::new();
        assert!(settings.validate().is_err());

        settings.runner_id = "test".to_string();

        // Invalid URL should fail
        settings.broker_url = "not-a-url".to_string();
        assert!(settings.validate().is_err());

        settings.broker_url = "http://localhost:8080".to_string();
        assert!(settings.validate().is_ok());

        // Zero concurrency should fail
        settings.concurrency = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_patch_overwrites_known_fields() {
        let manager = ConfigManager::new(RunnerSettings::default());

        let patch: RunnerPatch =
            serde_json::from_str(r#"{"concurrency": 4, "checkInterval": 30}"#).unwrap();
        manager.patch(patch);

        assert_eq!(manager.concurrency(), 4);
        assert_eq!(manager.check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_patches_layer_over_earlier_ones() {
        let manager = ConfigManager::new(RunnerSettings::default());

        let first: RunnerPatch =
            serde_json::from_str(r#"{"concurrency": 4, "zone": "eu-1"}"#).unwrap();
        manager.patch(first);

        let second: RunnerPatch = serde_json::from_str(r#"{"checkInterval": 60}"#).unwrap();
        manager.patch(second);

        // Later patch did not disturb unrelated fields
        assert_eq!(manager.concurrency(), 4);
        assert_eq!(manager.check_interval(), Duration::from_secs(60));
        assert_eq!(manager.snapshot().extra["zone"], "eu-1");
    }
}
