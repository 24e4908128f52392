//! Shared test harness: the full service graph wired against the in-memory
//! storage backend and hand-rolled collaborator fakes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use driftfeed::config::Config;
use driftfeed::db::memory::{MemoryContentStore, MemoryInteractionStore, MemoryStore};
use driftfeed::db::{ContentStore, NewContent};
use driftfeed::error::AppResult;
use driftfeed::routes::AppState;
use driftfeed::services::providers::{
    BlobStore, GenerationBackend, GenerationHandle, GenerationStatus, SearchHit, VectorIndex,
};
use driftfeed::services::{
    FeedPolicy, FeedQueue, GenerationOrchestrator, PreferenceEngine, TaskWorker,
};

/// Vector index fake: embeddings and probe hits are seeded by tests.
#[derive(Default)]
pub struct FakeIndex {
    pub embeddings: RwLock<HashMap<String, Vec<f32>>>,
    pub hits: RwLock<Vec<SearchHit>>,
    pub upserts: RwLock<Vec<(String, String)>>,
}

impl FakeIndex {
    pub async fn seed_embedding(&self, content_id: &str, embedding: Vec<f32>) {
        self.embeddings
            .write()
            .await
            .insert(content_id.to_string(), embedding);
    }

    pub async fn seed_hit(&self, content_id: &str, score: f32, prompt: &str) {
        self.hits.write().await.push(SearchHit {
            content_id: content_id.to_string(),
            score,
            prompt: Some(prompt.to_string()),
        });
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn upsert(&self, content_id: &str, prompt: &str) -> AppResult<()> {
        self.upserts
            .write()
            .await
            .push((content_id.to_string(), prompt.to_string()));
        Ok(())
    }

    async fn fetch_embedding(&self, content_id: &str) -> AppResult<Option<Vec<f32>>> {
        Ok(self.embeddings.read().await.get(content_id).cloned())
    }

    async fn search(&self, _query: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
        let hits = self.hits.read().await;
        Ok(hits.iter().take(top_k).cloned().collect())
    }
}

/// Blob store fake: a flat id listing plus deterministic URLs.
#[derive(Default)]
pub struct FakeBlobs {
    pub ids: RwLock<Vec<String>>,
}

impl FakeBlobs {
    pub async fn seed(&self, ids: &[&str]) {
        let mut stored = self.ids.write().await;
        for id in ids {
            stored.push(id.to_string());
        }
    }
}

#[async_trait]
impl BlobStore for FakeBlobs {
    async fn put(&self, content_id: &str, _bytes: Vec<u8>, _content_type: &str) -> AppResult<String> {
        self.ids.write().await.push(content_id.to_string());
        Ok(self.url_for(content_id))
    }

    async fn get(&self, _content_id: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn exists(&self, content_id: &str) -> AppResult<bool> {
        Ok(self.ids.read().await.iter().any(|id| id == content_id))
    }

    async fn list(&self, _prefix: &str, max: usize) -> AppResult<Vec<String>> {
        Ok(self.ids.read().await.iter().take(max).cloned().collect())
    }

    async fn delete(&self, content_id: &str) -> AppResult<bool> {
        let mut ids = self.ids.write().await;
        let before = ids.len();
        ids.retain(|id| id != content_id);
        Ok(ids.len() < before)
    }

    fn url_for(&self, content_id: &str) -> String {
        format!("blob://videos/{}", content_id)
    }
}

/// Generation backend fake: completes (or fails) on the first poll.
pub struct FakeBackend {
    pub fail_with: RwLock<Option<String>>,
    pub submitted: RwLock<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            fail_with: RwLock::new(None),
            submitted: RwLock::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.fail_with.write().await = message.map(|m| m.to_string());
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn submit(&self, prompt: &str) -> AppResult<GenerationHandle> {
        self.submitted.write().await.push(prompt.to_string());
        Ok(GenerationHandle(Uuid::new_v4().to_string()))
    }

    async fn poll(&self, handle: &GenerationHandle) -> AppResult<GenerationStatus> {
        if let Some(message) = self.fail_with.read().await.clone() {
            return Ok(GenerationStatus::Failed(message));
        }
        let content_id = format!("gen-{}", &handle.0[..8]);
        Ok(GenerationStatus::Complete {
            location: format!("blob://videos/{}", content_id),
            content_id,
        })
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub kv: Arc<MemoryStore>,
    pub content: Arc<MemoryContentStore>,
    pub interactions: Arc<MemoryInteractionStore>,
    pub index: Arc<FakeIndex>,
    pub blobs: Arc<FakeBlobs>,
    pub backend: Arc<FakeBackend>,
}

impl Harness {
    pub fn feed(&self) -> &FeedQueue {
        &self.state.feed
    }

    pub fn preferences(&self) -> &PreferenceEngine {
        &self.state.preferences
    }

    pub fn worker(&self) -> &TaskWorker {
        &self.state.worker
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.state.orchestrator
    }

    /// Seeds a piece of content everywhere the engine looks for it.
    pub async fn seed_content(&self, content_id: &str, prompt: &str, embedding: Vec<f32>) {
        self.blobs.seed(&[content_id]).await;
        self.index.seed_embedding(content_id, embedding).await;
        self.content
            .save_content_metadata(&NewContent {
                content_id: content_id.to_string(),
                location: format!("blob://videos/{}", content_id),
                prompt: prompt.to_string(),
                duration_seconds: Some(8),
            })
            .await
            .unwrap();
    }
}

/// Small-dimension config tuned for deterministic tests.
pub fn test_config() -> Config {
    let mut config: Config =
        envy::from_iter::<_, Config>(std::iter::empty::<(String, String)>()).unwrap();
    config.embedding_dim = 3;
    config.preference_update_threshold = 2;
    config.refill_update_floor = 2;
    config.generation_timeout_secs = 5;
    config
}

pub fn build_harness(config: Config) -> Harness {
    let config = Arc::new(config);
    let kv = Arc::new(MemoryStore::new());
    let content = Arc::new(MemoryContentStore::new());
    let interactions = Arc::new(MemoryInteractionStore::new());
    let index = Arc::new(FakeIndex::default());
    let blobs = Arc::new(FakeBlobs::default());
    let backend = Arc::new(FakeBackend::default());

    let feed = Arc::new(FeedQueue::new(
        kv.clone(),
        blobs.clone(),
        index.clone(),
        FeedPolicy::from(config.as_ref()),
    ));
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        kv.clone(),
        index.clone(),
        content.clone(),
        feed.clone(),
        config.clone(),
    ));
    let preferences = Arc::new(PreferenceEngine::new(
        interactions.clone(),
        index.clone(),
        kv.clone(),
        content.clone(),
        orchestrator.clone(),
        config.clone(),
    ));
    let worker = Arc::new(TaskWorker::new(
        kv.clone(),
        backend.clone(),
        content.clone(),
        index.clone(),
        feed.clone(),
        config.clone(),
    ));

    let state = Arc::new(AppState {
        config,
        feed,
        preferences,
        orchestrator,
        worker,
        content: content.clone(),
    });

    Harness {
        state,
        kv,
        content,
        interactions,
        index,
        blobs,
        backend,
    }
}
