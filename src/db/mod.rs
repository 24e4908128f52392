pub mod content;
pub mod interactions;
pub mod kv;
pub mod memory;
pub mod postgres;

pub use content::{ContentRecord, ContentStore, NewContent, PgContentStore};
pub use interactions::{InteractionStore, PgInteractionStore};
pub use kv::{create_redis_client, KeyValueStore, RedisStore};
pub use postgres::create_pool;
