use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::AppResult;

/// Stored metadata for one piece of content.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContentRecord {
    pub content_id: String,
    pub location: String,
    pub prompt: String,
    pub duration_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub share_count: i64,
}

/// Metadata written when new content lands in the blob store.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub content_id: String,
    pub location: String,
    pub prompt: String,
    pub duration_seconds: Option<i32>,
}

/// Relational metadata store for content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save_content_metadata(&self, content: &NewContent) -> AppResult<()>;
    async fn get_by_id(&self, content_id: &str) -> AppResult<Option<ContentRecord>>;
    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<ContentRecord>>;
    async fn increment_stats(
        &self,
        content_id: &str,
        views: i64,
        likes: i64,
        shares: i64,
    ) -> AppResult<()>;
}

/// PostgreSQL implementation.
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn save_content_metadata(&self, content: &NewContent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO content_items (content_id, location, prompt, duration_seconds)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (content_id)
            DO UPDATE SET location = EXCLUDED.location, prompt = EXCLUDED.prompt
            "#,
        )
        .bind(&content.content_id)
        .bind(&content.location)
        .bind(&content.prompt)
        .bind(content.duration_seconds)
        .execute(&self.pool)
        .await?;

        tracing::debug!(content_id = %content.content_id, "Saved content metadata");
        Ok(())
    }

    async fn get_by_id(&self, content_id: &str) -> AppResult<Option<ContentRecord>> {
        let record = sqlx::query_as::<_, ContentRecord>(
            r#"
            SELECT content_id, location, prompt, duration_seconds, created_at,
                   view_count, like_count, share_count
            FROM content_items
            WHERE content_id = $1
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<ContentRecord>> {
        let records = sqlx::query_as::<_, ContentRecord>(
            r#"
            SELECT content_id, location, prompt, duration_seconds, created_at,
                   view_count, like_count, share_count
            FROM content_items
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn increment_stats(
        &self,
        content_id: &str,
        views: i64,
        likes: i64,
        shares: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE content_items
            SET view_count = view_count + $2,
                like_count = like_count + $3,
                share_count = share_count + $4
            WHERE content_id = $1
            "#,
        )
        .bind(content_id)
        .bind(views)
        .bind(likes)
        .bind(shares)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
