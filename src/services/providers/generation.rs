/// HTTP client for the generative-video backend
///
/// Submit returns a job handle; poll reports progress. There is no cancel:
/// once submitted, a job runs to completion on the backend and an abandoned
/// result is simply never collected.
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::services::providers::{GenerationBackend, GenerationHandle, GenerationStatus};

#[derive(Clone)]
pub struct HttpGenerationBackend {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
}

impl HttpGenerationBackend {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    content_id: Option<String>,
    location: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn submit(&self, prompt: &str) -> AppResult<GenerationHandle> {
        let response = self
            .http_client
            .post(format!("{}/v1/jobs", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Generation backend returned status {}: {}",
                status, body
            )));
        }

        let payload: SubmitResponse = response.json().await?;
        tracing::info!(job_id = %payload.job_id, "Submitted generation job");
        Ok(GenerationHandle(payload.job_id))
    }

    async fn poll(&self, handle: &GenerationHandle) -> AppResult<GenerationStatus> {
        let response = self
            .http_client
            .get(format!("{}/v1/jobs/{}", self.api_url, handle.0))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Generation backend returned status {}: {}",
                status, body
            )));
        }

        let payload: PollResponse = response.json().await?;
        match payload.status.as_str() {
            "running" | "queued" => Ok(GenerationStatus::Running),
            "complete" => match (payload.content_id, payload.location) {
                (Some(content_id), Some(location)) => Ok(GenerationStatus::Complete {
                    content_id,
                    location,
                }),
                // A "complete" job without a result is a generation failure,
                // not a connectivity problem.
                _ => Ok(GenerationStatus::Failed(
                    "backend reported completion without a result".to_string(),
                )),
            },
            "failed" => Ok(GenerationStatus::Failed(
                payload.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Ok(GenerationStatus::Failed(format!(
                "unrecognized job status: {}",
                other
            ))),
        }
    }
}
