//! driftfeed: an infinite personalized video feed engine.
//!
//! Three coupled subsystems do the real work: a per-user ranked feed queue
//! with refill semantics that never runs dry, a preference-vector engine
//! over a sliding window of weighted interactions, and a generation-task
//! orchestrator plus worker loop that keeps new content flowing. Storage,
//! the vector index, and the generative backend are external collaborators
//! reached over the network.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
