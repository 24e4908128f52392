/// HTTP client for the blob-store gateway fronting video storage.
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::providers::BlobStore;

#[derive(Clone)]
pub struct HttpBlobStore {
    http_client: HttpClient,
    api_url: String,
}

impl HttpBlobStore {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
        }
    }

    fn object_url(&self, content_id: &str) -> String {
        format!("{}/objects/{}", self.api_url, content_id)
    }
}

#[derive(Deserialize)]
struct ListResponse {
    ids: Vec<String>,
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, content_id: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        let response = self
            .http_client
            .put(self.object_url(content_id))
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Blob store put returned status {}",
                status
            )));
        }

        tracing::debug!(content_id = %content_id, "Stored blob");
        Ok(self.url_for(content_id))
    }

    async fn get(&self, content_id: &str) -> AppResult<Option<Vec<u8>>> {
        let response = self
            .http_client
            .get(self.object_url(content_id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Blob store get returned status {}",
                status
            )));
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn exists(&self, content_id: &str) -> AppResult<bool> {
        let response = self
            .http_client
            .head(self.object_url(content_id))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn list(&self, prefix: &str, max: usize) -> AppResult<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/objects", self.api_url))
            .query(&[("prefix", prefix), ("max", &max.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalApi(format!(
                "Blob store list returned status {}",
                status
            )));
        }

        let payload: ListResponse = response.json().await?;
        Ok(payload.ids)
    }

    async fn delete(&self, content_id: &str) -> AppResult<bool> {
        let response = self
            .http_client
            .delete(self.object_url(content_id))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    fn url_for(&self, content_id: &str) -> String {
        self.object_url(content_id)
    }
}
