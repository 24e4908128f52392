use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::error::AppResult;

/// Creates a Redis client for the queue/key-value store
///
/// Connection pooling is handled by the multiplexed connection; a single
/// client is shared across all services.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Ordered-set and key-value primitives backing the feed queues, generation
/// queues, watched sets, and id mappings.
///
/// This is the single source of truth shared by the request path and the
/// worker loop; no state is held in process memory beyond it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Score-set semantics: re-adding a member updates its score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> AppResult<()>;
    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> AppResult<Vec<String>>;
    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<(String, f64)>>;
    async fn zrem(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn zcard(&self, key: &str) -> AppResult<usize>;
    /// Removes members by ascending rank; rank 0 is the lowest score.
    async fn zremrange_by_rank(&self, key: &str, start: isize, stop: isize) -> AppResult<usize>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()>;

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn srem(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn smembers(&self, key: &str) -> AppResult<Vec<String>>;

    async fn expire(&self, key: &str, ttl_secs: i64) -> AppResult<bool>;
    async fn del(&self, key: &str) -> AppResult<bool>;
    /// Glob-style key scan; used by the worker to discover users with queues.
    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>>;
}

/// Redis-backed implementation over a multiplexed async connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn conn(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: f64) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> AppResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.zrevrange(key, start, stop).await?)
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<(String, f64)>> {
        let mut conn = self.conn().await?;
        Ok(conn.zrevrange_withscores(key, start, stop).await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn zcard(&self, key: &str) -> AppResult<usize> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.zcard(key).await?;
        Ok(count as usize)
    }

    async fn zremrange_by_rank(&self, key: &str, start: isize, stop: isize) -> AppResult<usize> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.zremrangebyrank(key, start, stop).await?;
        Ok(removed as usize)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn smembers(&self, key: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.expire(key, ttl_secs).await?)
    }

    async fn del(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}
