use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters for a feed page read.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRequest {
    pub user_id: String,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Forces a clear-and-rebuild before serving the page.
    #[serde(default)]
    pub refresh: bool,
}

fn default_limit() -> usize {
    3
}

/// One hydrated entry of a feed page. `content_id` may carry a uniquifying
/// suffix and is what the client reports interactions against;
/// `canonical_id` is the underlying content.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub content_id: String,
    pub canonical_id: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub duration_seconds: Option<i32>,
    pub score: f64,
    pub created_at: Option<DateTime<Utc>>,
}

/// A served page. `has_more` is always true: the queue refills before it
/// can run dry, so the feed never reports exhaustion.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub success: bool,
    pub items: Vec<FeedItem>,
    pub cursor: usize,
    pub next_cursor: usize,
    pub has_more: bool,
    pub feed_size: usize,
    pub message: Option<String>,
}

impl FeedPage {
    pub fn failure(cursor: usize, message: impl Into<String>) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            cursor,
            next_cursor: cursor,
            // Even on error the feed does not claim exhaustion.
            has_more: true,
            feed_size: 0,
            message: Some(message.into()),
        }
    }
}

/// Health snapshot of one user's queue.
#[derive(Debug, Clone, Serialize)]
pub struct FeedStats {
    pub user_id: String,
    pub feed_size: usize,
    pub is_healthy: bool,
}
