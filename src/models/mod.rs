mod feed;
mod interaction;
mod task;
pub mod vector;

pub use feed::{FeedItem, FeedPage, FeedRequest, FeedStats};
pub use interaction::{
    canonical_content_id, InteractionRecord, InteractionType, PreferenceVector,
};
pub use task::{
    ExistingVideoTask, GenerateVideoTask, GenerationTask, QueueStatus, TaskStatus,
};
