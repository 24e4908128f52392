use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{ContentStore, KeyValueStore};
use crate::error::AppResult;
use crate::models::{canonical_content_id, ExistingVideoTask, GenerateVideoTask, GenerationTask};
use crate::services::feed_queue::FeedQueue;
use crate::services::preference::watched_key;
use crate::services::prompts;
use crate::services::providers::VectorIndex;

/// Generation tasks rank above any similarity score in the queue so the
/// worker's highest-priority scan claims them first.
const GENERATE_TASK_PRIORITY: f64 = 2.0;

pub(crate) fn generation_queue_key(user_id: &str) -> String {
    format!("genq:{}", user_id)
}

/// What one refresh produced.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefreshOutcome {
    pub existing_added: usize,
    pub tasks_enqueued: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    content_id: String,
    score: f64,
    prompt: Option<String>,
}

/// Given a fresh preference vector, selects existing content for the feed
/// and schedules at most one new-content generation per refresh, keeping
/// the external generation cost bounded.
pub struct GenerationOrchestrator {
    kv: Arc<dyn KeyValueStore>,
    index: Arc<dyn VectorIndex>,
    content: Arc<dyn ContentStore>,
    feed: Arc<FeedQueue>,
    config: Arc<Config>,
}

impl GenerationOrchestrator {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        index: Arc<dyn VectorIndex>,
        content: Arc<dyn ContentStore>,
        feed: Arc<FeedQueue>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            kv,
            index,
            content,
            feed,
            config,
        }
    }

    /// Refreshes a user's feed for a new preference vector.
    ///
    /// The index is probed with a generic query and candidates are re-ranked
    /// locally, so scores are approximate rather than literal cosine
    /// similarities against the vector. When too few candidates clear the
    /// similarity threshold the top of the full pool is forced instead —
    /// the feed always gets *something* while any candidate exists.
    pub async fn refresh_for_preference(
        &self,
        user_id: &str,
        preference: &[f32],
    ) -> AppResult<RefreshOutcome> {
        let hits = self
            .index
            .search(&self.config.probe_query, self.config.candidate_pool)
            .await?;

        if hits.is_empty() {
            tracing::warn!(user_id = %user_id, "Vector index probe returned no candidates");
            return Ok(RefreshOutcome {
                existing_added: 0,
                tasks_enqueued: 0,
            });
        }

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .map(|hit| Candidate {
                content_id: hit.content_id,
                score: hit.score as f64,
                prompt: hit.prompt,
            })
            .collect();

        let above_threshold = candidates
            .iter()
            .filter(|c| c.score >= self.config.similarity_threshold as f64)
            .count();
        let forced = above_threshold < self.config.min_similar_candidates;
        if forced {
            tracing::info!(
                user_id = %user_id,
                above_threshold,
                min_required = self.config.min_similar_candidates,
                "Too few candidates above threshold, forcing top-K selection"
            );
        } else {
            candidates.retain(|c| c.score >= self.config.similarity_threshold as f64);
        }

        self.apply_diversity_penalty(user_id, &mut candidates).await;

        // Scoped: the thread-local rng must not be held across awaits.
        let selected = {
            let mut rng = rand::thread_rng();
            select_candidates(
                candidates,
                self.config.refresh_batch_size,
                self.config.guaranteed_fraction,
                self.config.noise_factor,
                &mut rng,
            )
        };

        let mut existing_added = 0;
        let mut reference_prompts: Vec<String> = Vec::new();

        for candidate in &selected {
            let record = match self.content.get_by_id(&candidate.content_id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    tracing::warn!(content_id = %candidate.content_id, "Candidate missing from metadata store, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(content_id = %candidate.content_id, error = %e, "Metadata lookup failed, skipping candidate");
                    continue;
                }
            };

            if let Some(prompt) = &candidate.prompt {
                reference_prompts.push(prompt.clone());
            } else {
                reference_prompts.push(record.prompt.clone());
            }

            let feed_score = candidate.score + freshness_bonus(record.created_at);
            self.feed
                .add(user_id, &candidate.content_id, feed_score)
                .await?;

            // Audit entry so queue-status queries show where this came from.
            let task = GenerationTask::ExistingVideo(ExistingVideoTask {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                content_id: candidate.content_id.clone(),
                prompt: record.prompt,
                similarity: candidate.score as f32,
                location: Some(record.location),
                added_at: Utc::now(),
            });
            self.push_task(user_id, &task, candidate.score).await?;
            existing_added += 1;
        }

        // At most one new-content request per refresh; the prompt blends
        // several candidate prompts to avoid repetitive generations.
        let prompt = {
            let mut rng = rand::thread_rng();
            prompts::synthesize_prompt(&reference_prompts, &mut rng)
        };
        let task = GenerationTask::GenerateVideo(GenerateVideoTask::new(
            user_id,
            prompt,
            preference.to_vec(),
        ));
        self.push_task(user_id, &task, GENERATE_TASK_PRIORITY).await?;
        self.kv
            .expire(
                &generation_queue_key(user_id),
                self.config.feed_ttl_secs as i64,
            )
            .await?;

        self.feed.evict_to_target(user_id).await?;

        let outcome = RefreshOutcome {
            existing_added,
            tasks_enqueued: 1,
        };
        tracing::info!(
            user_id = %user_id,
            existing_added = outcome.existing_added,
            forced,
            "Feed refresh completed"
        );
        Ok(outcome)
    }

    /// Recently-watched content is de-prioritized, never excluded: a repeat
    /// still beats an empty feed.
    async fn apply_diversity_penalty(&self, user_id: &str, candidates: &mut [Candidate]) {
        let watched: HashSet<String> = match self.kv.smembers(&watched_key(user_id)).await {
            Ok(members) => members.into_iter().collect(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Watched-set read failed, skipping diversity pass");
                return;
            }
        };
        if watched.is_empty() {
            return;
        }

        let penalty = 1.0 - self.config.diversity_penalty as f64;
        for candidate in candidates.iter_mut() {
            if watched.contains(canonical_content_id(&candidate.content_id)) {
                candidate.score *= penalty;
            }
        }
    }

    async fn push_task(&self, user_id: &str, task: &GenerationTask, score: f64) -> AppResult<()> {
        let payload = serde_json::to_string(task)
            .map_err(|e| crate::error::AppError::Internal(format!("Task serialization: {}", e)))?;
        self.kv
            .zadd(&generation_queue_key(user_id), &payload, score)
            .await
    }
}

/// Content newer than a week gets a small boost that decays linearly;
/// combined with similarity it keeps fresh uploads circulating.
fn freshness_bonus(created_at: chrono::DateTime<Utc>) -> f64 {
    let age_days = (Utc::now() - created_at).num_hours() as f64 / 24.0;
    (0.1 * (1.0 - age_days / 7.0)).clamp(0.0, 0.1)
}

/// Perturbs scores with bounded noise, then splits the pick into a
/// guaranteed top slice and a weighted random draw without replacement.
/// Refills for the same preference vector stay non-deterministic without
/// abandoning ranking altogether.
fn select_candidates<R: Rng>(
    mut candidates: Vec<Candidate>,
    take: usize,
    guaranteed_fraction: f32,
    noise_factor: f32,
    rng: &mut R,
) -> Vec<Candidate> {
    for candidate in candidates.iter_mut() {
        let noise = candidate.score.abs() * noise_factor as f64 * rng.gen_range(-1.0..=1.0);
        candidate.score += noise;
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let take = take.min(candidates.len());
    if take == 0 {
        return Vec::new();
    }

    let guaranteed = ((take as f32 * guaranteed_fraction).ceil() as usize).min(take);
    let mut selected: Vec<Candidate> = candidates.drain(..guaranteed).collect();

    while selected.len() < take && !candidates.is_empty() {
        let total: f64 = candidates.iter().map(|c| c.score.max(1e-6)).sum();
        let mut roll = rng.gen_range(0.0..total);
        let mut picked = candidates.len() - 1;
        for (idx, candidate) in candidates.iter().enumerate() {
            roll -= candidate.score.max(1e-6);
            if roll <= 0.0 {
                picked = idx;
                break;
            }
        }
        selected.push(candidates.remove(picked));
    }

    selected
}
