//! Job-related API endpoints

use crate::BrokerClient;
use crate::error::Result;
use quarry_core::dto::job::{JobRequestResponse, TraceUpdate, TraceUpdateResponse};

impl BrokerClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Ask the broker for one job
    ///
    /// The broker may answer with nothing at all (`Ok(None)`), with a runner
    /// settings patch only, with a job only, or with both.
    ///
    /// # Arguments
    /// * `runner_id` - The ID of the runner requesting work
    pub async fn request_job(&self, runner_id: &str) -> Result<Option<JobRequestResponse>> {
        let url = format!("{}/api/runner/jobs/request", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "runnerId": runner_id }))
            .send()
            .await?;

        self.handle_optional_response(response).await
    }

    /// Push a trace update for a running job
    ///
    /// Streams accumulated trace entries (and the `done`/`failedReason`
    /// fields on the final report) to the broker. The response tells the
    /// runner whether the job was canceled out-of-band; any transport or
    /// API error means the update itself did not go through.
    ///
    /// # Arguments
    /// * `update` - The trace entries and status fields to report
    pub async fn update_job_trace(&self, update: &TraceUpdate) -> Result<TraceUpdateResponse> {
        let url = format!("{}/api/runner/jobs/{}/trace", self.base_url, update.job_id);
        let response = self.client.post(&url).json(update).send().await?;

        self.handle_response(response).await
    }
}
