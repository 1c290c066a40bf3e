//! Runner script DTOs

use serde::{Deserialize, Serialize};

/// A dynamically provisioned runner script for one job type
///
/// The broker returns the activated package for a job type; the runner
/// materializes it on disk and executes `entry` from the package root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerScriptPackage {
    /// Package name, unique per job type
    pub name: String,

    /// Activated version
    pub version: String,

    /// Entry point path, relative to the package root
    pub entry: String,

    /// Executable script body
    pub source: String,
}

impl RunnerScriptPackage {
    /// Directory name the package is installed under, e.g. `bundle-1.2.0`
    pub fn install_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_dir_name() {
        let package = RunnerScriptPackage {
            name: "bundle".to_string(),
            version: "1.2.0".to_string(),
            entry: "run.sh".to_string(),
            source: "#!/bin/sh\n".to_string(),
        };
        assert_eq!(package.install_dir_name(), "bundle-1.2.0");
    }
}
