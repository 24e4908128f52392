use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{ContentStore, KeyValueStore, NewContent};
use crate::error::{AppError, AppResult};
use crate::models::{GenerateVideoTask, GenerationTask, QueueStatus, TaskStatus};
use crate::services::feed_queue::FeedQueue;
use crate::services::orchestrator::generation_queue_key;
use crate::services::providers::{GenerationBackend, GenerationStatus, VectorIndex};

/// Newly generated content is highly personalized: high base score plus a
/// freshness boost so it surfaces promptly without drowning the feed.
const FRESH_CONTENT_SCORE: f64 = 0.9 + 0.1;

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// Counters surfaced by the worker status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub videos_generated: u64,
    pub failures: u64,
    pub tasks_reset: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Drains pending generation tasks: claims them, drives the generation
/// backend, writes results back, and repairs tasks stuck in-progress.
///
/// All task state lives in the key-value store; the worker itself only
/// holds claim locks and counters, so drain-once and poll-forever modes
/// share every code path.
pub struct TaskWorker {
    kv: Arc<dyn KeyValueStore>,
    backend: Arc<dyn GenerationBackend>,
    content: Arc<dyn ContentStore>,
    index: Arc<dyn VectorIndex>,
    feed: Arc<FeedQueue>,
    /// Per-user mutex closing the claim race: the read-check-write on the
    /// backing store is not atomic on its own.
    claim_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: RwLock<WorkerStats>,
    config: Arc<Config>,
}

impl TaskWorker {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        backend: Arc<dyn GenerationBackend>,
        content: Arc<dyn ContentStore>,
        index: Arc<dyn VectorIndex>,
        feed: Arc<FeedQueue>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            kv,
            backend,
            content,
            index,
            feed,
            claim_locks: Mutex::new(HashMap::new()),
            stats: RwLock::new(WorkerStats::default()),
            config,
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.claim_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn tasks_with_scores(&self, user_id: &str) -> AppResult<Vec<(String, f64, GenerationTask)>> {
        let members = self
            .kv
            .zrevrange_withscores(&generation_queue_key(user_id), 0, -1)
            .await?;
        Ok(members
            .into_iter()
            .filter_map(|(payload, score)| {
                match serde_json::from_str::<GenerationTask>(&payload) {
                    Ok(task) => Some((payload, score, task)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping unparseable task payload");
                        None
                    }
                }
            })
            .collect())
    }

    async fn replace_task(
        &self,
        user_id: &str,
        old_payload: &str,
        task: &GenerationTask,
        score: f64,
    ) -> AppResult<()> {
        let key = generation_queue_key(user_id);
        let payload = serde_json::to_string(task)
            .map_err(|e| AppError::Internal(format!("Task serialization: {}", e)))?;
        self.kv.zrem(&key, old_payload).await?;
        self.kv.zadd(&key, &payload, score).await
    }

    /// Claims the highest-priority pending generation task, persisting the
    /// `InProgress` flip before any external work. Exactly one caller wins
    /// a given task; the per-user lock serializes competing claims.
    pub async fn next_pending_task(&self, user_id: &str) -> AppResult<Option<GenerateVideoTask>> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        for (payload, score, task) in self.tasks_with_scores(user_id).await? {
            if let GenerationTask::GenerateVideo(mut generate) = task {
                if generate.status != TaskStatus::Pending {
                    continue;
                }
                generate.begin();
                let claimed = GenerationTask::GenerateVideo(generate.clone());
                self.replace_task(user_id, &payload, &claimed, score).await?;
                tracing::info!(
                    user_id = %user_id,
                    task_id = %generate.id,
                    "Claimed generation task"
                );
                return Ok(Some(generate));
            }
        }
        Ok(None)
    }

    /// Drains one user's queue. Failures mark the task `Failed` and move
    /// on; only explicit resubmission retries them.
    pub async fn process_user(&self, user_id: &str) -> AppResult<usize> {
        let mut processed = 0;
        while let Some(task) = self.next_pending_task(user_id).await? {
            let task_id = task.id;
            match self.execute(user_id, &task).await {
                Ok(content_id) => {
                    processed += 1;
                    let mut stats = self.stats.write().await;
                    stats.videos_generated += 1;
                    stats.last_activity = Some(Utc::now());
                    drop(stats);
                    tracing::info!(
                        user_id = %user_id,
                        task_id = %task_id,
                        content_id = %content_id,
                        "Generation task completed"
                    );
                }
                Err(e) => {
                    let mut stats = self.stats.write().await;
                    stats.failures += 1;
                    stats.last_activity = Some(Utc::now());
                    drop(stats);
                    tracing::error!(
                        user_id = %user_id,
                        task_id = %task_id,
                        error = %e,
                        "Generation task failed"
                    );
                    self.mark_failed(user_id, task_id, &e.to_string()).await?;
                }
            }
        }
        Ok(processed)
    }

    /// Resets stuck tasks, then drains every user's queue before returning.
    /// Concurrency stays at one in-flight generation; the external call is
    /// the expensive resource being bounded.
    pub async fn process_all_pending_tasks(&self) -> AppResult<usize> {
        let users = self.users_with_pending_tasks().await?;
        tracing::info!(users = users.len(), "Processing pending generation tasks");

        for user_id in &users {
            let reset = self.reset_stuck_tasks(user_id).await?;
            if reset > 0 {
                tracing::info!(user_id = %user_id, reset, "Reset stuck tasks");
            }
        }

        let mut total = 0;
        for user_id in &users {
            total += self.process_user(user_id).await?;
        }
        Ok(total)
    }

    async fn users_with_pending_tasks(&self) -> AppResult<Vec<String>> {
        let keys = self.kv.scan_keys("genq:*").await?;
        let mut users = Vec::new();
        for key in keys {
            let Some(user_id) = key.strip_prefix("genq:") else {
                continue;
            };
            let has_pending = self.tasks_with_scores(user_id).await?.iter().any(
                |(_, _, task)| matches!(
                    task,
                    GenerationTask::GenerateVideo(t) if t.status == TaskStatus::Pending
                ),
            );
            if has_pending {
                users.push(user_id.to_string());
            }
        }
        Ok(users)
    }

    /// Recovery sweep: in-progress tasks older than the age threshold are
    /// reset to pending. This is the only cancellation mechanism — the
    /// in-flight external call cannot be aborted, and its eventual result
    /// is simply discarded.
    pub async fn reset_stuck_tasks(&self, user_id: &str) -> AppResult<usize> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let max_age = Duration::seconds(self.config.stuck_task_max_age_secs);
        let mut reset = 0;
        for (payload, score, task) in self.tasks_with_scores(user_id).await? {
            if let GenerationTask::GenerateVideo(mut generate) = task {
                if generate.is_stuck(max_age) {
                    tracing::warn!(
                        user_id = %user_id,
                        task_id = %generate.id,
                        started_at = ?generate.started_at,
                        "Resetting stuck task to pending"
                    );
                    generate.reset();
                    let restored = GenerationTask::GenerateVideo(generate);
                    self.replace_task(user_id, &payload, &restored, score).await?;
                    reset += 1;
                }
            }
        }

        if reset > 0 {
            let mut stats = self.stats.write().await;
            stats.tasks_reset += reset as u64;
        }
        Ok(reset)
    }

    /// Failed tasks never retry automatically; this is the explicit
    /// resubmission path.
    pub async fn resubmit_failed_task(&self, user_id: &str, task_id: Uuid) -> AppResult<bool> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        for (payload, score, task) in self.tasks_with_scores(user_id).await? {
            if let GenerationTask::GenerateVideo(mut generate) = task {
                if generate.id == task_id && generate.status == TaskStatus::Failed {
                    generate.reset();
                    let restored = GenerationTask::GenerateVideo(generate);
                    self.replace_task(user_id, &payload, &restored, score).await?;
                    tracing::info!(user_id = %user_id, task_id = %task_id, "Resubmitted failed task");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn mark_failed(&self, user_id: &str, task_id: Uuid, error: &str) -> AppResult<()> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        for (payload, score, task) in self.tasks_with_scores(user_id).await? {
            if let GenerationTask::GenerateVideo(mut generate) = task {
                if generate.id == task_id {
                    generate.fail(error);
                    let failed = GenerationTask::GenerateVideo(generate);
                    self.replace_task(user_id, &payload, &failed, score).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Completed tasks are pruned from the queue, not archived in place.
    async fn remove_task(&self, user_id: &str, task_id: Uuid) -> AppResult<()> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        for (payload, _, task) in self.tasks_with_scores(user_id).await? {
            if task.id() == task_id {
                self.kv.zrem(&generation_queue_key(user_id), &payload).await?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Runs one claimed task to completion: generation call, metadata
    /// write-back, embedding upsert, feed insertion, queue pruning.
    async fn execute(&self, user_id: &str, task: &GenerateVideoTask) -> AppResult<String> {
        let handle = self.backend.submit(&task.prompt).await?;
        let deadline =
            std::time::Instant::now() + StdDuration::from_secs(self.config.generation_timeout_secs);

        loop {
            match self.backend.poll(&handle).await? {
                GenerationStatus::Running => {
                    if std::time::Instant::now() >= deadline {
                        return Err(AppError::Generation(format!(
                            "Generation job {} timed out",
                            handle.0
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                GenerationStatus::Failed(message) => {
                    return Err(AppError::Generation(message));
                }
                GenerationStatus::Complete {
                    content_id,
                    location,
                } => {
                    self.content
                        .save_content_metadata(&NewContent {
                            content_id: content_id.clone(),
                            location: location.clone(),
                            prompt: task.prompt.clone(),
                            duration_seconds: Some(8),
                        })
                        .await?;

                    // The video exists either way; a missing embedding only
                    // costs it future similarity matches.
                    if let Err(e) = self.index.upsert(&content_id, &task.prompt).await {
                        tracing::warn!(
                            content_id = %content_id,
                            error = %e,
                            "Embedding upsert failed for generated content"
                        );
                    }

                    self.feed
                        .add(user_id, &content_id, FRESH_CONTENT_SCORE)
                        .await?;
                    self.remove_task(user_id, task.id).await?;
                    return Ok(content_id);
                }
            }
        }
    }

    /// Snapshot of one user's generation queue.
    pub async fn queue_status(&self, user_id: &str) -> AppResult<QueueStatus> {
        let tasks: Vec<GenerationTask> = self
            .tasks_with_scores(user_id)
            .await?
            .into_iter()
            .map(|(_, _, task)| task)
            .collect();

        let mut status = QueueStatus {
            user_id: user_id.to_string(),
            queue_size: tasks.len(),
            ready: 0,
            pending: 0,
            in_progress: 0,
            failed: 0,
            tasks,
        };
        for task in &status.tasks {
            match task {
                GenerationTask::ExistingVideo(_) => status.ready += 1,
                GenerationTask::GenerateVideo(t) => match t.status {
                    TaskStatus::Pending => status.pending += 1,
                    TaskStatus::InProgress => status.in_progress += 1,
                    TaskStatus::Failed => status.failed += 1,
                    TaskStatus::Completed => {}
                },
            }
        }
        Ok(status)
    }

    pub async fn stats_snapshot(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    /// Poll-forever mode. The same drain the on-demand endpoint uses, on a
    /// timer.
    pub async fn run(self: Arc<Self>) {
        {
            let mut stats = self.stats.write().await;
            stats.started_at = Some(Utc::now());
        }
        tracing::info!(
            interval_secs = self.config.worker_poll_secs,
            "Background generation worker started"
        );

        loop {
            match self.process_all_pending_tasks().await {
                Ok(0) => {}
                Ok(processed) => tracing::info!(processed, "Worker cycle completed"),
                Err(e) => tracing::error!(error = %e, "Worker cycle failed"),
            }
            tokio::time::sleep(StdDuration::from_secs(self.config.worker_poll_secs)).await;
        }
    }
}
