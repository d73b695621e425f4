use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub type DbPool = SqlitePool;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("Failed to create database directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
}

/// Open (creating if needed) the database at `path` and run migrations
pub async fn initialize_db(path: &Path) -> Result<DbPool, DbError> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  info!(path = %path.display(), "Initializing database");

  let options = SqliteConnectOptions::new()
    .filename(path)
    .create_if_missing(true);

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect_with(options)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  info!("Database initialized");

  Ok(pool)
}
