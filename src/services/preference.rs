use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::db::{ContentStore, InteractionStore, KeyValueStore};
use crate::error::{AppError, AppResult};
use crate::models::vector::{l2_normalize, weighted_mean};
use crate::models::{
    canonical_content_id, InteractionRecord, InteractionType, PreferenceVector,
};
use crate::services::orchestrator::GenerationOrchestrator;
use crate::services::providers::VectorIndex;

pub(crate) fn watched_key(user_id: &str) -> String {
    format!("watched:{}", user_id)
}

/// Result of recording one interaction.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionAck {
    pub success: bool,
    pub preference_updated: bool,
    pub interactions_since_update: u32,
}

/// Maintains the sliding interaction window and the derived taste vector.
///
/// The vector is recomputed wholesale from the current window, never
/// incrementally, so a stale or corrupted vector heals on the next update.
pub struct PreferenceEngine {
    store: Arc<dyn InteractionStore>,
    index: Arc<dyn VectorIndex>,
    kv: Arc<dyn KeyValueStore>,
    content: Arc<dyn ContentStore>,
    orchestrator: Arc<GenerationOrchestrator>,
    config: Arc<Config>,
}

impl PreferenceEngine {
    pub fn new(
        store: Arc<dyn InteractionStore>,
        index: Arc<dyn VectorIndex>,
        kv: Arc<dyn KeyValueStore>,
        content: Arc<dyn ContentStore>,
        orchestrator: Arc<GenerationOrchestrator>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            index,
            kv,
            content,
            orchestrator,
            config,
        }
    }

    /// Persists one interaction and recomputes the preference vector when
    /// the update threshold is reached.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        content_id: &str,
        interaction_type: InteractionType,
    ) -> AppResult<InteractionAck> {
        let canonical = canonical_content_id(content_id);

        let embedding = self
            .index
            .fetch_embedding(canonical)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Content {} not found in vector index", canonical))
            })?;

        self.store
            .ensure_profile(user_id, self.config.window_size, self.config.embedding_dim)
            .await?;

        let weight = self.config.interaction_weight(interaction_type);
        let record = InteractionRecord {
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            interaction_type,
            weight,
            embedding,
            recorded_at: Utc::now(),
        };
        self.store.record(&record).await?;

        if interaction_type.is_consumption() {
            self.kv.sadd(&watched_key(user_id), canonical).await?;
        }

        // Engagement counters ride along; losing one must not fail the
        // interaction.
        let (views, likes, shares) = match interaction_type {
            InteractionType::View => (1, 0, 0),
            InteractionType::Like => (0, 1, 0),
            InteractionType::Share => (0, 0, 1),
            _ => (0, 0, 0),
        };
        if views + likes + shares > 0 {
            if let Err(e) = self
                .content
                .increment_stats(canonical, views, likes, shares)
                .await
            {
                tracing::warn!(content_id = %canonical, error = %e, "Engagement stat update failed");
            }
        }

        tracing::info!(
            user_id = %user_id,
            content_id = %canonical,
            interaction = interaction_type.as_str(),
            weight,
            "Recorded interaction"
        );

        let since_update = self.store.interactions_since_update(user_id).await?;
        if since_update >= self.config.preference_update_threshold {
            self.recompute_and_store(user_id).await?;
            Ok(InteractionAck {
                success: true,
                preference_updated: true,
                interactions_since_update: 1,
            })
        } else {
            self.store.bump_interaction_counter(user_id).await?;
            Ok(InteractionAck {
                success: true,
                preference_updated: false,
                interactions_since_update: since_update + 1,
            })
        }
    }

    /// Low-feed trigger: updates with the smaller floor so a barely-active
    /// user does not force a recompute on every refill.
    pub async fn maybe_update_for_refill(&self, user_id: &str) -> AppResult<bool> {
        let since_update = self.store.interactions_since_update(user_id).await?;
        if since_update < self.config.refill_update_floor {
            tracing::debug!(
                user_id = %user_id,
                since_update,
                floor = self.config.refill_update_floor,
                "Skipping preference update, too few interactions"
            );
            return Ok(false);
        }
        self.recompute_and_store(user_id).await?;
        Ok(true)
    }

    /// Recomputes the vector from the current window, persists it, and
    /// notifies the orchestrator so the feed reflects the new taste
    /// promptly instead of waiting for the next scheduled refill.
    async fn recompute_and_store(&self, user_id: &str) -> AppResult<Vec<f32>> {
        let window = self
            .store
            .recent_window(user_id, self.config.window_size)
            .await?;

        let rows: Vec<(Vec<f32>, f32)> = window
            .into_iter()
            .map(|record| (record.embedding, record.weight))
            .collect();

        let mut vector = weighted_mean(&rows, self.config.embedding_dim);
        l2_normalize(&mut vector);

        self.store.save_preference(user_id, &vector).await?;
        self.store.reset_interaction_counter(user_id).await?;

        tracing::info!(
            user_id = %user_id,
            window = rows.len(),
            "Recomputed preference vector"
        );

        let has_signal = vector.iter().any(|v| *v != 0.0);
        if has_signal {
            // Refresh failure degrades feed freshness, not the update itself.
            match self
                .orchestrator
                .refresh_for_preference(user_id, &vector)
                .await
            {
                Ok(outcome) => tracing::info!(
                    user_id = %user_id,
                    existing_added = outcome.existing_added,
                    tasks_enqueued = outcome.tasks_enqueued,
                    "Orchestrator refreshed for new preference"
                ),
                Err(e) => tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Orchestrator refresh failed after preference update"
                ),
            }
        }

        Ok(vector)
    }

    pub async fn get_preference(&self, user_id: &str) -> AppResult<Option<PreferenceVector>> {
        self.store.preference(user_id).await
    }

    /// Newest-first window of recent interactions.
    pub async fn get_interactions(&self, user_id: &str) -> AppResult<Vec<InteractionRecord>> {
        self.store
            .recent_window(user_id, self.config.window_size)
            .await
    }

    // Watched-set surface. Appended on consumption; removal is admin-level.

    pub async fn watched(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.kv.smembers(&watched_key(user_id)).await
    }

    pub async fn has_watched(&self, user_id: &str, content_id: &str) -> AppResult<bool> {
        self.kv
            .sismember(&watched_key(user_id), canonical_content_id(content_id))
            .await
    }

    pub async fn add_watched(&self, user_id: &str, content_id: &str) -> AppResult<bool> {
        self.kv
            .sadd(&watched_key(user_id), canonical_content_id(content_id))
            .await
    }

    pub async fn remove_watched(&self, user_id: &str, content_id: &str) -> AppResult<bool> {
        self.kv
            .srem(&watched_key(user_id), canonical_content_id(content_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::content::MockContentStore;
    use crate::db::interactions::MockInteractionStore;
    use crate::db::memory::MemoryStore;
    use crate::services::feed_queue::{FeedPolicy, FeedQueue};
    use crate::services::providers::{MockBlobStore, MockVectorIndex};

    fn test_config() -> Arc<Config> {
        let mut config: Config =
            envy::from_iter::<_, Config>(std::iter::empty::<(String, String)>()).unwrap();
        config.embedding_dim = 3;
        Arc::new(config)
    }

    fn engine_with(index: MockVectorIndex, store: MockInteractionStore) -> PreferenceEngine {
        let config = test_config();
        let kv: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let feed = Arc::new(FeedQueue::new(
            kv.clone(),
            Arc::new(MockBlobStore::new()),
            Arc::new(MockVectorIndex::new()),
            FeedPolicy::from(config.as_ref()),
        ));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            kv.clone(),
            Arc::new(MockVectorIndex::new()),
            Arc::new(MockContentStore::new()),
            feed,
            config.clone(),
        ));
        PreferenceEngine::new(
            Arc::new(store),
            Arc::new(index),
            kv,
            Arc::new(MockContentStore::new()),
            orchestrator,
            config,
        )
    }

    #[tokio::test]
    async fn interaction_on_unindexed_content_is_not_found() {
        let mut index = MockVectorIndex::new();
        index.expect_fetch_embedding().returning(|_| Ok(None));
        let engine = engine_with(index, MockInteractionStore::new());

        let err = engine
            .record_interaction("u1", "missing", InteractionType::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn suffixed_id_is_canonicalized_before_the_embedding_lookup() {
        let mut index = MockVectorIndex::new();
        index
            .expect_fetch_embedding()
            .withf(|content_id| content_id == "v1")
            .returning(|_| Ok(None));
        let engine = engine_with(index, MockInteractionStore::new());

        // NotFound is fine; the assertion is the canonical id reaching the
        // index instead of the suffixed one.
        let _ = engine
            .record_interaction("u1", "v1:3:9", InteractionType::View)
            .await;
    }

    #[tokio::test]
    async fn refill_trigger_respects_the_minimum_floor() {
        let mut store = MockInteractionStore::new();
        store
            .expect_interactions_since_update()
            .returning(|_| Ok(1));
        let engine = engine_with(MockVectorIndex::new(), store);

        let updated = engine.maybe_update_for_refill("u1").await.unwrap();
        assert!(!updated, "one interaction is below the floor of three");
    }
}
