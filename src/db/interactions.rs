use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool, Row};

use crate::error::AppResult;
use crate::models::{InteractionRecord, InteractionType, PreferenceVector};

/// Persistence seam for the interaction log and preference vectors.
///
/// The log is append-only; the window is a read-time view over the newest
/// rows. Counters live next to the vector so the threshold check is one read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Creates the preference row lazily on first interaction.
    async fn ensure_profile(&self, user_id: &str, window_size: u32, dimension: usize)
        -> AppResult<()>;
    async fn record(&self, interaction: &InteractionRecord) -> AppResult<()>;
    /// Newest-first window of at most `limit` records.
    async fn recent_window(&self, user_id: &str, limit: u32) -> AppResult<Vec<InteractionRecord>>;
    async fn preference(&self, user_id: &str) -> AppResult<Option<PreferenceVector>>;
    async fn save_preference(&self, user_id: &str, vector: &[f32]) -> AppResult<()>;
    async fn interactions_since_update(&self, user_id: &str) -> AppResult<u32>;
    async fn bump_interaction_counter(&self, user_id: &str) -> AppResult<()>;
    /// Resets to 1, not 0: the interaction that fired the update is itself
    /// the first of the next window.
    async fn reset_interaction_counter(&self, user_id: &str) -> AppResult<()>;
}

#[derive(FromRow)]
struct InteractionRow {
    content_id: String,
    interaction_type: String,
    weight: f32,
    embedding: Json<Vec<f32>>,
    recorded_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PreferenceRow {
    preference_vector: Json<Vec<f32>>,
    window_size: i32,
    interactions_since_update: i32,
    last_updated: DateTime<Utc>,
}

/// PostgreSQL implementation.
pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_interaction_type(raw: &str) -> InteractionType {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .unwrap_or(InteractionType::Other)
}

#[async_trait]
impl InteractionStore for PgInteractionStore {
    async fn ensure_profile(
        &self,
        user_id: &str,
        window_size: u32,
        dimension: usize,
    ) -> AppResult<()> {
        let zero = vec![0.0_f32; dimension];
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, preference_vector, window_size, interactions_since_update)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(Json(zero))
        .bind(window_size as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record(&self, interaction: &InteractionRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_interactions (user_id, content_id, interaction_type, weight, embedding, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&interaction.user_id)
        .bind(&interaction.content_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.weight)
        .bind(Json(interaction.embedding.clone()))
        .bind(interaction.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_window(&self, user_id: &str, limit: u32) -> AppResult<Vec<InteractionRecord>> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT content_id, interaction_type, weight, embedding, recorded_at
            FROM user_interactions
            WHERE user_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InteractionRecord {
                user_id: user_id.to_string(),
                content_id: row.content_id,
                interaction_type: parse_interaction_type(&row.interaction_type),
                weight: row.weight,
                embedding: row.embedding.0,
                recorded_at: row.recorded_at,
            })
            .collect())
    }

    async fn preference(&self, user_id: &str) -> AppResult<Option<PreferenceVector>> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            r#"
            SELECT preference_vector, window_size, interactions_since_update, last_updated
            FROM user_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PreferenceVector {
            user_id: user_id.to_string(),
            vector: row.preference_vector.0,
            window_size: row.window_size as u32,
            interactions_since_update: row.interactions_since_update.max(0) as u32,
            last_updated: row.last_updated,
        }))
    }

    async fn save_preference(&self, user_id: &str, vector: &[f32]) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE user_preferences
            SET preference_vector = $2, last_updated = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(Json(vector.to_vec()))
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, "Saved preference vector");
        Ok(())
    }

    async fn interactions_since_update(&self, user_id: &str) -> AppResult<u32> {
        let row = sqlx::query(
            "SELECT interactions_since_update FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| r.get::<i32, _>("interactions_since_update").max(0) as u32)
            .unwrap_or(0))
    }

    async fn bump_interaction_counter(&self, user_id: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE user_preferences
            SET interactions_since_update = interactions_since_update + 1
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_interaction_counter(&self, user_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE user_preferences SET interactions_since_update = 1 WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
