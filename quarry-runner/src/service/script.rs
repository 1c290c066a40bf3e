//! Script resolution service
//!
//! Produces an executable entry point for a job's type: first by
//! installing the broker-activated script package, falling back to the
//! statically bundled implementation when the broker has none. A bundled
//! implementation exists for every known job type by construction; a
//! missing one is a deployment error that surfaces when the worker fails
//! to spawn, never a silent drop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use quarry_client::BrokerClient;
use quarry_core::dto::script::RunnerScriptPackage;
use tracing::{debug, info};

/// Service trait for resolving runner scripts
#[async_trait]
pub trait ScriptResolver: Send + Sync {
    /// Installs the broker-activated script for a job type, if one exists
    ///
    /// `Ok(None)` means the broker has no dynamic package for this job
    /// type and the bundled entry should be used. An error means the job
    /// must be failed without starting a worker.
    async fn resolve_dynamic(&self, job_type: &str) -> Result<Option<PathBuf>>;

    /// Entry point of the statically bundled implementation for a job type
    fn bundled_entry(&self, job_type: &str) -> PathBuf;
}

/// Resolver backed by the broker's script-provisioning endpoint
pub struct BrokerScriptResolver {
    client: Arc<BrokerClient>,
    install_dir: PathBuf,
    bundled_dir: PathBuf,
}

impl BrokerScriptResolver {
    pub fn new(client: Arc<BrokerClient>, install_dir: PathBuf, bundled_dir: PathBuf) -> Self {
        Self {
            client,
            install_dir,
            bundled_dir,
        }
    }
}

#[async_trait]
impl ScriptResolver for BrokerScriptResolver {
    async fn resolve_dynamic(&self, job_type: &str) -> Result<Option<PathBuf>> {
        let package = self
            .client
            .get_activated_runner_script(job_type)
            .await
            .with_context(|| format!("Failed to fetch activated script for '{}'", job_type))?;

        let Some(package) = package else {
            debug!("No activated script for '{}', using bundled entry", job_type);
            return Ok(None);
        };

        info!(
            "Installing runner script {} {} for '{}'",
            package.name, package.version, job_type
        );
        let entry = install_package(&self.install_dir, &package).await?;
        Ok(Some(entry))
    }

    fn bundled_entry(&self, job_type: &str) -> PathBuf {
        self.bundled_dir.join(job_type).join("run")
    }
}

/// Writes a script package under the install directory and returns its
/// entry point, marked executable.
///
/// Installation is idempotent per name/version; re-installing overwrites.
async fn install_package(install_dir: &Path, package: &RunnerScriptPackage) -> Result<PathBuf> {
    let package_dir = install_dir.join(package.install_dir_name());
    let entry = package_dir.join(&package.entry);

    tokio::fs::create_dir_all(&package_dir)
        .await
        .with_context(|| format!("Failed to create {}", package_dir.display()))?;

    tokio::fs::write(&entry, package.source.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", entry.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o755))
            .await
            .with_context(|| format!("Failed to mark {} executable", entry.display()))?;
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_package() -> RunnerScriptPackage {
        RunnerScriptPackage {
            name: "bundle".to_string(),
            version: "1.2.0".to_string(),
            entry: "run.sh".to_string(),
            source: "#!/bin/sh\necho ok\n".to_string(),
        }
    }

    #[test]
    fn test_bundled_entry_derivation() {
        let resolver = BrokerScriptResolver::new(
            Arc::new(BrokerClient::new("http://localhost:8080")),
            PathBuf::from("/var/quarry/installed"),
            PathBuf::from("/var/quarry/bundled"),
        );
        assert_eq!(
            resolver.bundled_entry("audit"),
            PathBuf::from("/var/quarry/bundled/audit/run")
        );
    }

    #[tokio::test]
    async fn test_install_package_writes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().to_path_buf();

        let entry = install_package(&install_dir, &test_package()).await.unwrap();
        assert_eq!(entry, install_dir.join("bundle-1.2.0").join("run.sh"));

        let written = tokio::fs::read_to_string(&entry).await.unwrap();
        assert!(written.starts_with("#!/bin/sh"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = tokio::fs::metadata(&entry).await.unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_install_package_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().to_path_buf();

        let first = install_package(&install_dir, &test_package()).await.unwrap();
        let second = install_package(&install_dir, &test_package()).await.unwrap();
        assert_eq!(first, second);
    }
}
