pub mod feed_queue;
pub mod orchestrator;
pub mod preference;
pub mod prompts;
pub mod providers;
pub mod worker;

pub use feed_queue::{fetch_feed, FeedPolicy, FeedQueue};
pub use orchestrator::{GenerationOrchestrator, RefreshOutcome};
pub use preference::{InteractionAck, PreferenceEngine};
pub use worker::{TaskWorker, WorkerStats};
