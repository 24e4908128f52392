use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use driftfeed::config::Config;
use driftfeed::db::{
    create_pool, create_redis_client, ContentStore, InteractionStore, KeyValueStore,
    PgContentStore, PgInteractionStore, RedisStore,
};
use driftfeed::routes::{create_router, AppState};
use driftfeed::services::providers::{
    BlobStore, HttpBlobStore, HttpGenerationBackend, HttpVectorIndex, VectorIndex,
};
use driftfeed::services::{
    FeedPolicy, FeedQueue, GenerationOrchestrator, PreferenceEngine, TaskWorker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    // Storage collaborators
    let db_pool = create_pool(&config.database_url).await?;
    let redis_client = create_redis_client(&config.redis_url)?;
    let kv: Arc<dyn KeyValueStore> = Arc::new(RedisStore::new(redis_client));
    let content: Arc<dyn ContentStore> = Arc::new(PgContentStore::new(db_pool.clone()));
    let interactions: Arc<dyn InteractionStore> = Arc::new(PgInteractionStore::new(db_pool));

    // External service collaborators
    let index: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndex::new(
        config.vector_index_url.clone(),
        config.vector_index_api_key.clone(),
        config.vector_index_namespace.clone(),
    ));
    let blobs: Arc<dyn BlobStore> = Arc::new(HttpBlobStore::new(config.blob_store_url.clone()));
    let backend = Arc::new(HttpGenerationBackend::new(
        config.generation_api_url.clone(),
        config.generation_api_key.clone(),
    ));

    // Service graph
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
        interactions,
        index.clone(),
        kv.clone(),
        content.clone(),
        orchestrator.clone(),
        config.clone(),
    ));
    let worker = Arc::new(TaskWorker::new(
        kv,
        backend,
        content.clone(),
        index,
        feed.clone(),
        config.clone(),
    ));

    // Background poll loop; the request path shares no memory with it
    // beyond the key-value store.
    tokio::spawn(worker.clone().run());

    let state = Arc::new(AppState {
        config: config.clone(),
        feed,
        preferences,
        orchestrator,
        worker,
        content,
    });
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "driftfeed listening");
    axum::serve(listener, app).await?;

    Ok(())
}
