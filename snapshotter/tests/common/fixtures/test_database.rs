//! Test database utilities for in-memory SQLite testing

use anyhow::Result;
use snapshotter::database::{Database, RunStatus};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;

/// Test database wrapper for in-memory SQLite
pub struct TestDatabase {
    db: Arc<Database>,
}

impl TestDatabase {
    /// Create a new in-memory test database with the full schema applied
    pub async fn new() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Database::from_pool(pool).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Insert a finished attempt with one successful target per alias
    pub async fn seed_successful_attempt(&self, block_height: u64, aliases: &[&str]) -> Result<i64> {
        let attempt = self.db.create_attempt(block_height, false).await?;
        for alias in aliases {
            let target = self
                .db
                .create_target_result(
                    attempt.id,
                    alias,
                    &format!("mainnet/{}/{}", alias, block_height),
                    false,
                )
                .await?;
            self.db
                .finish_target_result(target.id, RunStatus::Success, None)
                .await?;
        }
        self.db
            .finish_attempt(attempt.id, RunStatus::Success, None)
            .await?;
        Ok(attempt.id)
    }

    /// Insert a failed attempt without targets
    pub async fn seed_failed_attempt(&self, block_height: u64, message: &str) -> Result<i64> {
        let attempt = self.db.create_attempt(block_height, false).await?;
        self.db
            .finish_attempt(attempt.id, RunStatus::Failed, Some(message))
            .await?;
        Ok(attempt.id)
    }
}
