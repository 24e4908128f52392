/// HTTP client for the vector-similarity index
///
/// Speaks a small JSON API: upsert a prompt under a content id, fetch a
/// stored embedding, and run a text search that the server embeds and
/// scores. Namespaced so prompt embeddings stay separate from anything
/// else sharing the index.
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::services::providers::{SearchHit, VectorIndex};

#[derive(Clone)]
pub struct HttpVectorIndex {
    http_client: HttpClient,
    api_url: String,
    api_key: String,
    namespace: String,
}

impl HttpVectorIndex {
    pub fn new(api_url: String, api_key: String, namespace: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            api_key,
            namespace,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHitPayload>,
}

#[derive(Deserialize)]
struct SearchHitPayload {
    id: String,
    score: f32,
    prompt: Option<String>,
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn upsert(&self, content_id: &str, prompt: &str) -> AppResult<()> {
        let url = format!("{}/v1/vectors/{}/upsert", self.api_url, self.namespace);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "id": content_id,
                "text": prompt,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Vector index upsert returned status {}: {}",
                status, body
            )));
        }

        tracing::debug!(content_id = %content_id, "Upserted prompt embedding");
        Ok(())
    }

    async fn fetch_embedding(&self, content_id: &str) -> AppResult<Option<Vec<f32>>> {
        let url = format!(
            "{}/v1/vectors/{}/{}",
            self.api_url, self.namespace, content_id
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Vector index fetch returned status {}: {}",
                status, body
            )));
        }

        let payload: EmbeddingResponse = response.json().await?;
        Ok(payload.embedding)
    }

    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
        let url = format!("{}/v1/vectors/{}/search", self.api_url, self.namespace);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "top_k": top_k,
                "fields": ["prompt"],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Vector index search returned status {}: {}",
                status, body
            )));
        }

        let payload: SearchResponse = response.json().await?;
        let hits: Vec<SearchHit> = payload
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                content_id: hit.id,
                score: hit.score,
                prompt: hit.prompt,
            })
            .collect();

        tracing::debug!(query = %query, hits = hits.len(), "Vector index probe completed");
        Ok(hits)
    }
}
