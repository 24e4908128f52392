use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a generation task. Transitions are owned by the worker:
/// `Pending -> InProgress -> Completed | Failed`, plus the recovery sweep's
/// `InProgress -> Pending` for stuck tasks and an explicit admin
/// `Failed -> Pending` resubmission. `Failed` is terminal for automatic
/// processing; it is never re-claimed on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Audit record for a ready-made match the orchestrator pushed straight
/// into the feed. Carries no lifecycle; it exists so queue-status queries
/// show where feed entries came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingVideoTask {
    pub id: Uuid,
    pub user_id: String,
    pub content_id: String,
    pub prompt: String,
    pub similarity: f32,
    pub location: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// A request for new content from the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVideoTask {
    pub id: Uuid,
    pub user_id: String,
    pub prompt: String,
    /// Taste at enqueue time; the vector may move on before the worker runs.
    pub preference_snapshot: Vec<f32>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_content_id: Option<String>,
    pub result_location: Option<String>,
    pub error: Option<String>,
}

impl GenerateVideoTask {
    pub fn new(user_id: impl Into<String>, prompt: impl Into<String>, snapshot: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            prompt: prompt.into(),
            preference_snapshot: snapshot,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result_content_id: None,
            result_location: None,
            error: None,
        }
    }

    /// Claims the task. Must be persisted before any external work starts.
    pub fn begin(&mut self) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, content_id: impl Into<String>, location: impl Into<String>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result_content_id = Some(content_id.into());
        self.result_location = Some(location.into());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// In-progress past the age threshold: presumed abandoned. The original
    /// external call cannot be cancelled; its eventual result is discarded.
    pub fn is_stuck(&self, max_age: Duration) -> bool {
        self.status == TaskStatus::InProgress
            && self
                .started_at
                .map(|t| Utc::now() - t > max_age)
                .unwrap_or(true)
    }

    /// Puts a stuck or failed task back in line for a fresh claim.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error = None;
    }
}

/// Queue payload: one variant per task kind, matched exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationTask {
    ExistingVideo(ExistingVideoTask),
    GenerateVideo(GenerateVideoTask),
}

impl GenerationTask {
    pub fn id(&self) -> Uuid {
        match self {
            GenerationTask::ExistingVideo(t) => t.id,
            GenerationTask::GenerateVideo(t) => t.id,
        }
    }
}

/// Snapshot of a user's generation queue for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub user_id: String,
    pub queue_size: usize,
    pub ready: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub tasks: Vec<GenerationTask>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_stamps_started_at() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![0.0; 4]);
        assert_eq!(task.status, TaskStatus::Pending);
        task.begin();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.started_at.is_some());
    }

    #[test]
    fn completion_records_result() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![]);
        task.begin();
        task.complete("vid-9", "blob://videos/vid-9.mp4");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_content_id.as_deref(), Some("vid-9"));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn failure_keeps_error_and_is_not_pending() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![]);
        task.begin();
        task.fail("backend returned incomplete result");
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.is_some());
    }

    #[test]
    fn reset_clears_claim_state() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![]);
        task.begin();
        task.fail("boom");
        task.reset();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(task.error.is_none());
    }

    #[test]
    fn fresh_in_progress_task_is_not_stuck() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![]);
        task.begin();
        assert!(!task.is_stuck(Duration::seconds(600)));
    }

    #[test]
    fn old_in_progress_task_is_stuck() {
        let mut task = GenerateVideoTask::new("u1", "a dog surfing", vec![]);
        task.begin();
        task.started_at = Some(Utc::now() - Duration::seconds(900));
        assert!(task.is_stuck(Duration::seconds(600)));
    }

    #[test]
    fn tagged_payload_round_trips() {
        let task = GenerationTask::GenerateVideo(GenerateVideoTask::new("u1", "p", vec![1.0]));
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"type\":\"generate_video\""));
        let back: GenerationTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), task.id());
    }
}
