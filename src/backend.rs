//! Submitting adjusted images to the backend.
//!
//! The [`Submitter`] trait is the seam between the session controller and the
//! network: the production implementation is [`HttpSubmitter`] (reqwest), and
//! tests use a recording mock. A submission succeeds only when the backend
//! answers with a 2xx status and a JSON body containing `"success": true`.

use crate::config::BackendConfig;
use crate::types::{SubmitPayload, SubmitResponse};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),
    #[error("could not reach backend: {0}")]
    Network(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("backend returned HTTP {0}")]
    Status(u16),
    #[error("backend rejected the submission: {}", .0.as_deref().unwrap_or("no reason given"))]
    Rejected(Option<String>),
    #[error("unreadable backend response: {0}")]
    InvalidResponse(String),
    #[error("submission task aborted")]
    Aborted,
}

impl SubmitError {
    /// Failures where the request may never have reached the backend.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SubmitError::Network(_) | SubmitError::Timeout(_) | SubmitError::Aborted
        )
    }
}

/// Something that can deliver a [`SubmitPayload`] to the backend.
pub trait Submitter: Send + Sync + 'static {
    fn submit(
        &self,
        payload: &SubmitPayload,
    ) -> impl Future<Output = Result<(), SubmitError>> + Send;
}

/// Interpret a decoded apply response.
pub fn check_response(response: SubmitResponse) -> Result<(), SubmitError> {
    if response.success {
        Ok(())
    } else {
        Err(SubmitError::Rejected(response.error))
    }
}

/// reqwest-backed submitter posting JSON to `<base_url><apply_path>`.
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpSubmitter {
    pub fn new(base_url: &str, apply_path: &str, timeout_secs: u64) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SubmitError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: join_endpoint(base_url, apply_path),
            timeout_secs,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, SubmitError> {
        Self::new(
            &config.base_url,
            &config.apply_path,
            config.request_timeout_secs,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn join_endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Submitter for HttpSubmitter {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), SubmitError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmitError::Timeout(self.timeout_secs)
                } else {
                    SubmitError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status.as_u16()));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::InvalidResponse(e.to_string()))?;

        check_response(parsed)
    }
}
