/// External collaborator abstractions
///
/// The engine reaches three services over the network: the vector-similarity
/// index (prompt embeddings), the blob store holding video bytes, and the
/// generative backend that renders video from a prompt. Each is a trait so
/// tests can substitute fakes and so a provider can be swapped without
/// touching the engine.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub mod blob;
pub mod generation;
pub mod vector_index;

pub use blob::HttpBlobStore;
pub use generation::HttpGenerationBackend;
pub use vector_index::HttpVectorIndex;

/// One candidate returned by a similarity probe.
///
/// `score` is whatever the index reports for the probe query, re-ranked
/// locally by the orchestrator; it is not a cosine similarity against the
/// preference vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content_id: String,
    pub score: f32,
    pub prompt: Option<String>,
}

/// Vector-similarity index over content prompts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Indexes a prompt under the content id, replacing any prior entry.
    async fn upsert(&self, content_id: &str, prompt: &str) -> AppResult<()>;

    /// Embedding for one piece of content; `None` when it was never indexed.
    async fn fetch_embedding(&self, content_id: &str) -> AppResult<Option<Vec<f32>>>;

    /// Broad text probe returning up to `top_k` scored candidates.
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>>;
}

/// Blob storage for video bytes. Only identifiers and URLs cross this seam
/// on the hot path; bytes move on upload/download only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, content_id: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String>;
    async fn get(&self, content_id: &str) -> AppResult<Option<Vec<u8>>>;
    async fn exists(&self, content_id: &str) -> AppResult<bool>;
    async fn list(&self, prefix: &str, max: usize) -> AppResult<Vec<String>>;
    async fn delete(&self, content_id: &str) -> AppResult<bool>;
    /// Public URL for a stored blob.
    fn url_for(&self, content_id: &str) -> String;
}

/// Opaque reference to an in-flight generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationHandle(pub String);

/// Result of polling a generation job.
#[derive(Debug, Clone)]
pub enum GenerationStatus {
    Running,
    Complete { content_id: String, location: String },
    Failed(String),
}

/// The generative-video backend. Calls are slow (tens of seconds); only the
/// worker, which runs off the request path, may wait on them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn submit(&self, prompt: &str) -> AppResult<GenerationHandle>;
    async fn poll(&self, handle: &GenerationHandle) -> AppResult<GenerationStatus>;
}
