//! In-process backend used by the test suite and for running the engine
//! without external services. Mirrors the Redis/Postgres implementations
//! closely enough that the service layer cannot tell them apart; TTLs are
//! recorded but never enforced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::content::{ContentRecord, ContentStore, NewContent};
use crate::db::interactions::InteractionStore;
use crate::db::kv::KeyValueStore;
use crate::error::AppResult;
use crate::models::{InteractionRecord, PreferenceVector};

#[derive(Default)]
struct KvState {
    zsets: HashMap<String, HashMap<String, f64>>,
    strings: HashMap<String, String>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory `KeyValueStore`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<KvState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_desc(zset: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut members: Vec<(String, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    // Ties broken lexicographically like Redis does.
    members.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    });
    members
}

fn clamp_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let resolve = |idx: isize| -> isize {
        if idx < 0 {
            len as isize + idx
        } else {
            idx
        }
    };
    let start = resolve(start).max(0) as usize;
    let stop = resolve(stop);
    if stop < 0 || start >= len {
        return None;
    }
    let stop = (stop as usize).min(len.saturating_sub(1));
    if start > stop {
        return None;
    }
    Some((start, stop))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> AppResult<Vec<String>> {
        Ok(self
            .zrevrange_withscores(key, start, stop)
            .await?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<(String, f64)>> {
        let state = self.state.read().await;
        let Some(zset) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let members = sorted_desc(zset);
        Ok(match clamp_range(members.len(), start, stop) {
            Some((start, stop)) => members[start..=stop].to_vec(),
            None => Vec::new(),
        })
    }

    async fn zrem(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .zsets
            .get_mut(key)
            .map(|zset| zset.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn zcard(&self, key: &str) -> AppResult<usize> {
        let state = self.state.read().await;
        Ok(state.zsets.get(key).map(|zset| zset.len()).unwrap_or(0))
    }

    async fn zremrange_by_rank(&self, key: &str, start: isize, stop: isize) -> AppResult<usize> {
        let mut state = self.state.write().await;
        let Some(zset) = state.zsets.get_mut(key) else {
            return Ok(0);
        };
        // Ascending rank: lowest score first.
        let mut members = sorted_desc(zset);
        members.reverse();
        let Some((start, stop)) = clamp_range(members.len(), start, stop) else {
            return Ok(0);
        };
        let doomed: Vec<String> = members[start..=stop]
            .iter()
            .map(|(member, _)| member.clone())
            .collect();
        for member in &doomed {
            zset.remove(member);
        }
        Ok(doomed.len())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state.strings.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl_secs: u64) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .sets
            .get_mut(key)
            .map(|set| set.remove(member))
            .unwrap_or(false))
    }

    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, _ttl_secs: i64) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.zsets.contains_key(key)
            || state.strings.contains_key(key)
            || state.sets.contains_key(key))
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let removed = state.zsets.remove(key).is_some()
            | state.strings.remove(key).is_some()
            | state.sets.remove(key).is_some();
        Ok(removed)
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let state = self.state.read().await;
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut keys: Vec<String> = state
            .zsets
            .keys()
            .chain(state.strings.keys())
            .chain(state.sets.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// In-memory `ContentStore`.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    records: Arc<RwLock<HashMap<String, ContentRecord>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn save_content_metadata(&self, content: &NewContent) -> AppResult<()> {
        let mut records = self.records.write().await;
        let entry = records
            .entry(content.content_id.clone())
            .or_insert_with(|| ContentRecord {
                content_id: content.content_id.clone(),
                location: content.location.clone(),
                prompt: content.prompt.clone(),
                duration_seconds: content.duration_seconds,
                created_at: Utc::now(),
                view_count: 0,
                like_count: 0,
                share_count: 0,
            });
        entry.location = content.location.clone();
        entry.prompt = content.prompt.clone();
        Ok(())
    }

    async fn get_by_id(&self, content_id: &str) -> AppResult<Option<ContentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(content_id).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<ContentRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<ContentRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn increment_stats(
        &self,
        content_id: &str,
        views: i64,
        likes: i64,
        shares: i64,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(content_id) {
            record.view_count += views;
            record.like_count += likes;
            record.share_count += shares;
        }
        Ok(())
    }
}

#[derive(Default)]
struct ProfileState {
    vector: Vec<f32>,
    window_size: u32,
    interactions_since_update: u32,
    last_updated: Option<chrono::DateTime<Utc>>,
}

/// In-memory `InteractionStore`.
#[derive(Clone, Default)]
pub struct MemoryInteractionStore {
    log: Arc<RwLock<Vec<InteractionRecord>>>,
    profiles: Arc<RwLock<HashMap<String, ProfileState>>>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn ensure_profile(
        &self,
        user_id: &str,
        window_size: u32,
        dimension: usize,
    ) -> AppResult<()> {
        let mut profiles = self.profiles.write().await;
        profiles
            .entry(user_id.to_string())
            .or_insert_with(|| ProfileState {
                vector: vec![0.0; dimension],
                window_size,
                interactions_since_update: 0,
                last_updated: Some(Utc::now()),
            });
        Ok(())
    }

    async fn record(&self, interaction: &InteractionRecord) -> AppResult<()> {
        let mut log = self.log.write().await;
        log.push(interaction.clone());
        Ok(())
    }

    async fn recent_window(&self, user_id: &str, limit: u32) -> AppResult<Vec<InteractionRecord>> {
        let log = self.log.read().await;
        let mut window: Vec<InteractionRecord> = log
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        window.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        window.truncate(limit as usize);
        Ok(window)
    }

    async fn preference(&self, user_id: &str) -> AppResult<Option<PreferenceVector>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).map(|profile| PreferenceVector {
            user_id: user_id.to_string(),
            vector: profile.vector.clone(),
            window_size: profile.window_size,
            interactions_since_update: profile.interactions_since_update,
            last_updated: profile.last_updated.unwrap_or_else(Utc::now),
        }))
    }

    async fn save_preference(&self, user_id: &str, vector: &[f32]) -> AppResult<()> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles.entry(user_id.to_string()).or_default();
        profile.vector = vector.to_vec();
        profile.last_updated = Some(Utc::now());
        Ok(())
    }

    async fn interactions_since_update(&self, user_id: &str) -> AppResult<u32> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .get(user_id)
            .map(|profile| profile.interactions_since_update)
            .unwrap_or(0))
    }

    async fn bump_interaction_counter(&self, user_id: &str) -> AppResult<()> {
        let mut profiles = self.profiles.write().await;
        if let Some(profile) = profiles.get_mut(user_id) {
            profile.interactions_since_update += 1;
        }
        Ok(())
    }

    async fn reset_interaction_counter(&self, user_id: &str) -> AppResult<()> {
        let mut profiles = self.profiles.write().await;
        if let Some(profile) = profiles.get_mut(user_id) {
            profile.interactions_since_update = 1;
        }
        Ok(())
    }
}
