use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Database pool not initialized")]
    NotInitialized,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

static POOL: OnceLock<PgPool> = OnceLock::new();

/// Connect the process-wide pool from DATABASE_URL and run pending migrations.
/// Called once from main before the router starts serving.
pub async fn init_pool() -> Result<PgPool, DatabaseError> {
    let url = std::env::var("DATABASE_URL")
        .map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;

    let cfg = &config::config().database;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(cfg.connection_timeout_secs))
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Sqlx(e.into()))?;

    info!("Database pool connected ({} max connections)", cfg.max_connections);
    let _ = POOL.set(pool.clone());
    Ok(pool)
}

/// Process-wide pool handle. Handlers call this rather than threading the
/// pool through every signature.
pub fn db() -> Result<&'static PgPool, DatabaseError> {
    POOL.get().ok_or(DatabaseError::NotInitialized)
}

/// Pings the pool to ensure connectivity
pub async fn health_check() -> Result<(), DatabaseError> {
    let pool = db()?;
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

impl From<DatabaseError> for crate::error::ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Sqlx(e) => e.into(),
            other => {
                tracing::error!("database error: {}", other);
                crate::error::ApiError::service_unavailable("Database temporarily unavailable")
            }
        }
    }
}
