//! Quarry Broker Client
//!
//! A simple, type-safe HTTP client for communicating with the Quarry job
//! broker API.
//!
//! This crate is the runner's only window onto the broker: it requests
//! jobs, fetches activated runner scripts, and streams trace updates back.
//!
//! # Example
//!
//! ```no_run
//! use quarry_client::BrokerClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BrokerClient::new("http://localhost:8080");
//!
//!     if let Some(response) = client.request_job("runner-001").await? {
//!         if let Some(job) = response.job {
//!             println!("assigned job {} ({})", job.job_id, job.job_type);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod scripts;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use quarry_core::dto::job::{JobRequestResponse, TraceUpdate, TraceUpdateResponse};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Quarry broker API
///
/// The broker contract is deliberately narrow, three calls in two groups:
/// - Job lifecycle (request a job, push trace/status updates)
/// - Runner script provisioning (fetch the activated script for a job type)
#[derive(Debug, Clone)]
pub struct BrokerClient {
    /// Base URL of the broker (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BrokerClient {
    /// Create a new broker client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the broker API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new broker client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the broker
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response where `204 No Content` is a valid outcome
    ///
    /// Polling-style endpoints answer with no body when there is nothing to
    /// hand out; that maps to `Ok(None)` rather than an error.
    async fn handle_optional_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<T>> {
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BrokerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BrokerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = BrokerClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
