use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Config;
use crate::db::{ContentStore, KeyValueStore};
use crate::error::AppResult;
use crate::models::vector::cosine_similarity;
use crate::models::{canonical_content_id, FeedItem, FeedPage, FeedRequest, FeedStats};
use crate::services::preference::PreferenceEngine;
use crate::services::providers::{BlobStore, VectorIndex};

/// Queue sizing and expiry policy.
#[derive(Debug, Clone)]
pub struct FeedPolicy {
    /// A rebuilt queue holds exactly this many entries.
    pub target_size: usize,
    /// A page read that would leave fewer than this forces a refill.
    pub refill_threshold: usize,
    pub ttl_secs: i64,
    pub mapping_ttl_secs: u64,
}

impl From<&Config> for FeedPolicy {
    fn from(config: &Config) -> Self {
        Self {
            target_size: config.target_feed_size,
            refill_threshold: config.refill_threshold,
            ttl_secs: config.feed_ttl_secs as i64,
            mapping_ttl_secs: config.mapping_ttl_secs,
        }
    }
}

fn feed_key(user_id: &str) -> String {
    format!("feed:{}", user_id)
}

fn mapping_key(user_id: &str, member: &str) -> String {
    format!("feedmap:{}:{}", user_id, member)
}

/// Per-user ranked queue of content ids, backed by a sorted set in the
/// key-value store. Owns refill and eviction policy; scoring inputs come
/// from the vector index and the blob store's content listing.
pub struct FeedQueue {
    kv: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    policy: FeedPolicy,
}

impl FeedQueue {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        policy: FeedPolicy,
    ) -> Self {
        Self {
            kv,
            blobs,
            index,
            policy,
        }
    }

    pub fn target_size(&self) -> usize {
        self.policy.target_size
    }

    /// Highest-scored entries first. An empty or exhausted queue yields an
    /// empty page, never an error.
    pub async fn page(
        &self,
        user_id: &str,
        cursor: usize,
        count: usize,
    ) -> AppResult<Vec<(String, f64)>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.kv
            .zrevrange_withscores(
                &feed_key(user_id),
                cursor as isize,
                (cursor + count - 1) as isize,
            )
            .await
    }

    /// Score-set semantics: re-adding an id updates its score and still
    /// counts as success.
    pub async fn add(&self, user_id: &str, content_id: &str, score: f64) -> AppResult<()> {
        self.kv.zadd(&feed_key(user_id), content_id, score).await
    }

    pub async fn remove(&self, user_id: &str, content_id: &str) -> AppResult<bool> {
        self.kv.zrem(&feed_key(user_id), content_id).await
    }

    pub async fn size(&self, user_id: &str) -> AppResult<usize> {
        self.kv.zcard(&feed_key(user_id)).await
    }

    pub async fn clear(&self, user_id: &str) -> AppResult<()> {
        self.kv.del(&feed_key(user_id)).await?;
        Ok(())
    }

    pub async fn set_ttl(&self, user_id: &str, ttl_secs: i64) -> AppResult<()> {
        self.kv.expire(&feed_key(user_id), ttl_secs).await?;
        Ok(())
    }

    pub async fn stats(&self, user_id: &str) -> AppResult<FeedStats> {
        let feed_size = self.size(user_id).await?;
        Ok(FeedStats {
            user_id: user_id.to_string(),
            feed_size,
            is_healthy: feed_size >= self.policy.refill_threshold,
        })
    }

    /// Resolves a possibly-suffixed member back to its canonical content id.
    /// The stored mapping wins; an expired mapping falls back to prefix
    /// parsing, which is equivalent for ids the queue itself minted.
    pub async fn canonical_id(&self, user_id: &str, member: &str) -> String {
        if !member.contains(':') {
            return member.to_string();
        }
        match self.kv.get(&mapping_key(user_id, member)).await {
            Ok(Some(canonical)) => canonical,
            _ => canonical_content_id(member).to_string(),
        }
    }

    /// Queue size is a hard ceiling: drops lowest-ranked entries past the
    /// target.
    pub async fn evict_to_target(&self, user_id: &str) -> AppResult<usize> {
        let size = self.size(user_id).await?;
        if size <= self.policy.target_size {
            return Ok(0);
        }
        let excess = size - self.policy.target_size;
        let removed = self
            .kv
            .zremrange_by_rank(&feed_key(user_id), 0, excess as isize - 1)
            .await?;
        if removed > 0 {
            tracing::debug!(user_id = %user_id, removed, "Evicted lowest-ranked feed entries");
        }
        Ok(removed)
    }

    /// Clears and rebuilds the queue to exactly the target size.
    ///
    /// With a usable preference vector, available content is re-scored by
    /// cosine similarity against it; otherwise entries get randomized
    /// bootstrap scores. Either way the queue is topped up with suffixed
    /// duplicates when fewer distinct items exist than the target, so the
    /// feed can never run dry on a thin catalog.
    pub async fn rebuild(&self, user_id: &str, preference: Option<&[f32]>) -> AppResult<usize> {
        self.clear(user_id).await?;

        let available = self.blobs.list("videos/", 1000).await?;
        if available.is_empty() {
            tracing::warn!(user_id = %user_id, "No content available to rebuild feed");
            return Ok(0);
        }

        let scored = match preference {
            Some(vector) => self.score_by_preference(&available, vector).await,
            None => Vec::new(),
        };

        let added = if scored.is_empty() {
            self.fill_bootstrap(user_id, &available).await?
        } else {
            self.fill_scored(user_id, scored).await?
        };

        self.set_ttl(user_id, self.policy.ttl_secs).await?;
        tracing::info!(
            user_id = %user_id,
            added,
            target = self.policy.target_size,
            "Rebuilt feed queue"
        );
        Ok(added)
    }

    /// Cosine-scores the catalog against the preference vector. Content
    /// without an embedding gets a low randomized score so it can still
    /// surface; index errors degrade to the bootstrap path.
    async fn score_by_preference(&self, available: &[String], vector: &[f32]) -> Vec<(String, f64)> {
        let mut scored = Vec::with_capacity(available.len());
        for content_id in available {
            let canonical = canonical_content_id(content_id);
            match self.index.fetch_embedding(canonical).await {
                Ok(Some(embedding)) => {
                    let similarity = cosine_similarity(vector, &embedding) as f64;
                    scored.push((canonical.to_string(), similarity));
                }
                Ok(None) => {
                    let fallback = rand::thread_rng().gen::<f64>() * 0.3;
                    scored.push((canonical.to_string(), fallback));
                }
                Err(e) => {
                    tracing::warn!(content_id = %canonical, error = %e, "Embedding fetch failed during rebuild");
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    async fn fill_scored(&self, user_id: &str, scored: Vec<(String, f64)>) -> AppResult<usize> {
        let mut added = 0;
        for (content_id, score) in scored.iter().take(self.policy.target_size) {
            self.add(user_id, content_id, *score).await?;
            added += 1;
        }

        // Thin catalog: repeat the best items under uniquifying suffixes
        // until the queue reaches the target.
        let mut round = 1;
        while added < self.policy.target_size && !scored.is_empty() {
            for (content_id, score) in scored.iter() {
                if added >= self.policy.target_size {
                    break;
                }
                let member = format!("{}:{}:{}", content_id, round, added);
                self.kv
                    .set_ex(
                        &mapping_key(user_id, &member),
                        content_id,
                        self.policy.mapping_ttl_secs,
                    )
                    .await?;
                // Repeats rank below the original occurrence.
                self.add(user_id, &member, *score - round as f64).await?;
                added += 1;
            }
            round += 1;
        }
        Ok(added)
    }

    /// No-preference fill: shuffled rounds of the catalog with randomized
    /// scores, each id made unique per slot.
    async fn fill_bootstrap(&self, user_id: &str, available: &[String]) -> AppResult<usize> {
        let mut added = 0;
        let mut round = 0;
        while added < self.policy.target_size {
            let mut shuffled: Vec<&String> = available.iter().collect();
            shuffled.shuffle(&mut rand::thread_rng());

            for content_id in shuffled {
                if added >= self.policy.target_size {
                    break;
                }
                let canonical = canonical_content_id(content_id).to_string();
                let member = format!("{}:{}:{}", canonical, round, added);
                self.kv
                    .set_ex(
                        &mapping_key(user_id, &member),
                        &canonical,
                        self.policy.mapping_ttl_secs,
                    )
                    .await?;
                let score = rand::thread_rng().gen::<f64>() + round as f64;
                self.add(user_id, &member, score).await?;
                added += 1;
            }
            round += 1;
        }
        Ok(added)
    }

    /// Hydrates raw queue members into feed items. Metadata comes from the
    /// relational store; content missing there still ships with a blob URL
    /// so an out-of-sync metadata store degrades detail, not availability.
    pub async fn hydrate(
        &self,
        user_id: &str,
        rows: Vec<(String, f64)>,
        content: &dyn ContentStore,
    ) -> Vec<FeedItem> {
        let mut items = Vec::with_capacity(rows.len());
        for (member, score) in rows {
            let canonical = self.canonical_id(user_id, &member).await;
            let record = match content.get_by_id(&canonical).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(content_id = %canonical, error = %e, "Metadata lookup failed during hydration");
                    None
                }
            };

            let item = match record {
                Some(record) => FeedItem {
                    content_id: member,
                    canonical_id: canonical,
                    url: Some(record.location),
                    title: Some(record.prompt),
                    duration_seconds: record.duration_seconds,
                    score,
                    created_at: Some(record.created_at),
                },
                None => FeedItem {
                    url: Some(self.blobs.url_for(&canonical)),
                    content_id: member,
                    canonical_id: canonical,
                    title: None,
                    duration_seconds: None,
                    score,
                    created_at: None,
                },
            };
            items.push(item);
        }
        items
    }
}

/// Serves one feed page, upholding the never-run-dry invariant.
///
/// A read that would leave the queue below the refill threshold, or whose
/// cursor already walked past the end, first gives the preference engine a
/// chance to recompute (low-feed floor) and then synchronously rebuilds the
/// queue — a slower response in exchange for a feed that never terminates.
pub async fn fetch_feed(
    feed: &FeedQueue,
    preferences: &PreferenceEngine,
    content: &dyn ContentStore,
    request: FeedRequest,
) -> FeedPage {
    let user_id = request.user_id.clone();
    let mut cursor = request.cursor;

    match serve_page(feed, preferences, content, &user_id, &mut cursor, &request).await {
        Ok(page) => page,
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Feed read failed");
            FeedPage::failure(cursor, format!("Failed to retrieve feed: {}", e))
        }
    }
}

async fn serve_page(
    feed: &FeedQueue,
    preferences: &PreferenceEngine,
    content: &dyn ContentStore,
    user_id: &str,
    cursor: &mut usize,
    request: &FeedRequest,
) -> AppResult<FeedPage> {
    let mut size = feed.size(user_id).await?;

    if request.refresh || size == 0 {
        rebuild_with_preference(feed, preferences, user_id).await?;
        size = feed.size(user_id).await?;
    }

    let remaining_after = size.saturating_sub(*cursor + request.limit);
    if remaining_after < feed.policy.refill_threshold || *cursor >= size {
        maybe_update_preference(preferences, user_id).await;
        rebuild_with_preference(feed, preferences, user_id).await?;
        size = feed.size(user_id).await?;

        if *cursor >= size {
            // The rebuilt queue starts over; continue from its head.
            tracing::debug!(user_id = %user_id, cursor = *cursor, "Cursor past rebuilt feed, resetting to 0");
            *cursor = 0;
        }
    }

    let rows = feed.page(user_id, *cursor, request.limit).await?;
    let items = feed.hydrate(user_id, rows, content).await;
    let next_cursor = *cursor + items.len();

    Ok(FeedPage {
        success: true,
        items,
        cursor: *cursor,
        next_cursor,
        has_more: true,
        feed_size: size,
        message: None,
    })
}

async fn rebuild_with_preference(
    feed: &FeedQueue,
    preferences: &PreferenceEngine,
    user_id: &str,
) -> AppResult<()> {
    let preference = match preferences.get_preference(user_id).await {
        Ok(preference) => preference.filter(|p| p.has_signal()),
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Preference lookup failed, rebuilding without it");
            None
        }
    };
    feed.rebuild(user_id, preference.as_ref().map(|p| p.vector.as_slice()))
        .await?;
    Ok(())
}

/// A low feed is the one place preference updates jump the usual threshold;
/// errors here must not take down the read path.
async fn maybe_update_preference(preferences: &PreferenceEngine, user_id: &str) {
    match preferences.maybe_update_for_refill(user_id).await {
        Ok(true) => tracing::info!(user_id = %user_id, "Preference updated by low-feed trigger"),
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Low-feed preference update failed")
        }
    }
}
