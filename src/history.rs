//! Recommendation history and persisted engine timestamps
//!
//! History is an append-mostly log keyed by window label and capped at the
//! configured number of entries per label. Writes for one label are
//! serialized so the insert and the eviction of the oldest entries land
//! together or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::db::DbPool;
use crate::models::recommendation::RecommendationHistoryEntry;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum HistoryError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// ---------------------------------------------------------------------------
/// Store Contracts
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait HistoryStore: Send + Sync {
  async fn save(&self, entry: &RecommendationHistoryEntry) -> Result<(), HistoryError>;

  /// Most recent entry for a window label
  async fn last_for(&self, window_label: &str) -> Result<Option<RecommendationHistoryEntry>, HistoryError>;

  /// Newest first
  async fn recent_for(
    &self,
    window_label: &str,
    limit: usize,
  ) -> Result<Vec<RecommendationHistoryEntry>, HistoryError>;

  /// Returns the number of entries removed
  async fn clear(&self, window_label: &str) -> Result<u64, HistoryError>;

  /// Drop all history and timestamps
  async fn clear_all(&self) -> Result<(), HistoryError>;
}

#[async_trait]
pub trait TimestampStore: Send + Sync {
  async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, HistoryError>;

  async fn set_timestamp(&self, key: &str, at: DateTime<Utc>) -> Result<(), HistoryError>;
}

/// Everything the orchestrator persists, behind one object
pub trait EngineStore: HistoryStore + TimestampStore {}

impl<T: HistoryStore + TimestampStore> EngineStore for T {}

pub const LAST_DATA_REFRESH_KEY: &str = "last_data_refresh";

pub fn generated_key(window_label: &str) -> String {
  format!("last_generated:{}", window_label)
}

/// ---------------------------------------------------------------------------
/// SQLite Store
/// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct HistoryRow {
  window_label: String,
  generated_at: DateTime<Utc>,
  analyzed_period: String,
  recommendations_json: String,
  snapshot_json: String,
}

impl HistoryRow {
  fn into_entry(self) -> Result<RecommendationHistoryEntry, HistoryError> {
    Ok(RecommendationHistoryEntry {
      generated_at: self.generated_at,
      window_label: self.window_label,
      analyzed_period: self.analyzed_period,
      recommendations: serde_json::from_str(&self.recommendations_json)?,
      snapshot: serde_json::from_str(&self.snapshot_json)?,
    })
  }
}

pub struct SqliteHistoryStore {
  pool: DbPool,
  limit: usize,
  label_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SqliteHistoryStore {
  pub fn new(pool: DbPool, limit: usize) -> Self {
    Self {
      pool,
      limit: limit.max(1),
      label_locks: Mutex::new(HashMap::new()),
    }
  }

  fn lock_for(&self, window_label: &str) -> Arc<tokio::sync::Mutex<()>> {
    self
      .label_locks
      .lock()
      .entry(window_label.to_string())
      .or_default()
      .clone()
  }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
  async fn save(&self, entry: &RecommendationHistoryEntry) -> Result<(), HistoryError> {
    let recommendations_json = serde_json::to_string(&entry.recommendations)?;
    let snapshot_json = serde_json::to_string(&entry.snapshot)?;

    let lock = self.lock_for(&entry.window_label);
    let _guard = lock.lock().await;

    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
      INSERT INTO recommendation_history (
        window_label, generated_at, analyzed_period, recommendations_json, snapshot_json
      )
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
    )
    .bind(&entry.window_label)
    .bind(entry.generated_at)
    .bind(&entry.analyzed_period)
    .bind(&recommendations_json)
    .bind(&snapshot_json)
    .execute(&mut *tx)
    .await?;

    let evicted = sqlx::query(
      r#"
      DELETE FROM recommendation_history
      WHERE window_label = ?1
        AND id NOT IN (
          SELECT id FROM recommendation_history
          WHERE window_label = ?1
          ORDER BY generated_at DESC, id DESC
          LIMIT ?2
        )
      "#,
    )
    .bind(&entry.window_label)
    .bind(self.limit as i64)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    debug!(window = %entry.window_label, evicted, "Saved recommendation history");
    Ok(())
  }

  async fn last_for(&self, window_label: &str) -> Result<Option<RecommendationHistoryEntry>, HistoryError> {
    Ok(self.recent_for(window_label, 1).await?.into_iter().next())
  }

  async fn recent_for(
    &self,
    window_label: &str,
    limit: usize,
  ) -> Result<Vec<RecommendationHistoryEntry>, HistoryError> {
    let rows: Vec<HistoryRow> = sqlx::query_as(
      r#"
      SELECT window_label, generated_at, analyzed_period, recommendations_json, snapshot_json
      FROM recommendation_history
      WHERE window_label = ?1
      ORDER BY generated_at DESC, id DESC
      LIMIT ?2
      "#,
    )
    .bind(window_label)
    .bind(limit as i64)
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(HistoryRow::into_entry).collect()
  }

  async fn clear(&self, window_label: &str) -> Result<u64, HistoryError> {
    let lock = self.lock_for(window_label);
    let _guard = lock.lock().await;

    let removed = sqlx::query("DELETE FROM recommendation_history WHERE window_label = ?1")
      .bind(window_label)
      .execute(&self.pool)
      .await?
      .rows_affected();
    Ok(removed)
  }

  async fn clear_all(&self) -> Result<(), HistoryError> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM recommendation_history")
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM engine_timestamps")
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(())
  }
}

#[async_trait]
impl TimestampStore for SqliteHistoryStore {
  async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, HistoryError> {
    let row: Option<(DateTime<Utc>,)> =
      sqlx::query_as("SELECT value FROM engine_timestamps WHERE key = ?1")
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
    Ok(row.map(|(at,)| at))
  }

  async fn set_timestamp(&self, key: &str, at: DateTime<Utc>) -> Result<(), HistoryError> {
    sqlx::query(
      r#"
      INSERT INTO engine_timestamps (key, value)
      VALUES (?1, ?2)
      ON CONFLICT(key) DO UPDATE SET value = excluded.value
      "#,
    )
    .bind(key)
    .bind(at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
