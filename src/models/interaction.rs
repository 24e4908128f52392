use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a user engaged with a piece of content.
///
/// The numeric weight attached to each type is configuration
/// (`Config::interaction_weight`), not part of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Like,
    Save,
    Comment,
    Share,
    View,
    Skip,
    Dislike,
    /// Unknown types deserialize here instead of failing the request.
    #[serde(other)]
    Other,
}

impl InteractionType {
    /// Consumption interactions imply the content was actually seen and
    /// feed the watched set; reactions like `Comment` do not on their own.
    pub fn is_consumption(self) -> bool {
        matches!(
            self,
            InteractionType::View | InteractionType::Like | InteractionType::Save
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionType::Like => "like",
            InteractionType::Save => "save",
            InteractionType::Comment => "comment",
            InteractionType::Share => "share",
            InteractionType::View => "view",
            InteractionType::Skip => "skip",
            InteractionType::Dislike => "dislike",
            InteractionType::Other => "other",
        }
    }
}

/// One row of the append-only interaction log. Immutable once written;
/// the sliding window is a read-time view, not a physical trim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: String,
    pub content_id: String,
    pub interaction_type: InteractionType,
    pub weight: f32,
    pub embedding: Vec<f32>,
    pub recorded_at: DateTime<Utc>,
}

/// A user's current taste embedding.
///
/// Invariant: `vector` is either all zeros (no data yet) or L2-normalized.
/// Only the preference engine mutates this; request handlers read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceVector {
    pub user_id: String,
    pub vector: Vec<f32>,
    pub window_size: u32,
    pub interactions_since_update: u32,
    pub last_updated: DateTime<Utc>,
}

impl PreferenceVector {
    /// A zero vector means "no taste signal yet" and must not be used
    /// for similarity scoring.
    pub fn has_signal(&self) -> bool {
        self.vector.iter().any(|v| *v != 0.0)
    }
}

/// Strips the uniquifying `:{round}:{slot}` suffix the feed queue appends
/// when the same content occupies multiple slots. Plain ids pass through.
pub fn canonical_content_id(content_id: &str) -> &str {
    match content_id.find(':') {
        Some(idx) => &content_id[..idx],
        None => content_id,
    }
}
