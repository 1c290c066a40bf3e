//! Runner-script provisioning endpoints

use crate::BrokerClient;
use crate::error::Result;
use quarry_core::dto::script::RunnerScriptPackage;

impl BrokerClient {
    // =============================================================================
    // Script Provisioning
    // =============================================================================

    /// Fetch the activated runner script package for a job type
    ///
    /// Returns `Ok(None)` when the broker has no dynamically activated
    /// package for this job type, in which case the runner falls back to
    /// its bundled implementation.
    ///
    /// # Arguments
    /// * `job_type` - The job type to fetch a script for
    pub async fn get_activated_runner_script(
        &self,
        job_type: &str,
    ) -> Result<Option<RunnerScriptPackage>> {
        let url = format!(
            "{}/api/runner/scripts/{}/activated",
            self.base_url, job_type
        );
        let response = self.client.get(&url).send().await?;

        self.handle_optional_response(response).await
    }
}
