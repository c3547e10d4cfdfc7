//! Audit store for snapshot attempts.
//!
//! SQLite persistence for:
//! - Snapshot attempts ("runs") and their lifecycle status
//! - Per-target results owned by an attempt
//!
//! Rows are never physically removed; retention flips the `deleted` flag.
//!
//! The module is organized into submodules:
//! - `records` - Record types (entities)
//! - `migrations` - Forward-only schema evolution with a ledger table
//! - `attempts` - Attempt queries and updates
//! - `targets` - Target result queries and updates

mod attempts;
mod migrations;
mod records;
mod targets;

pub use migrations::{applied_migrations, run_migrations, MIGRATIONS};
pub use records::*;

use anyhow::Result;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("=== Starting database initialization ===");
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!("FAILED to create parent directory {:?}: {}", parent, e);
                    return Err(e.into());
                }
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Connection URL: {}", database_url);
                return Err(e.into());
            }
        };

        let database = Self::from_pool(pool).await?;
        info!("=== Database initialization completed successfully ===");
        Ok(database)
    }

    /// Wrap an existing pool, creating the schema and applying pending migrations
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let database = Self { pool };

        if let Err(e) = database.initialize_tables().await {
            error!("CRITICAL: Database table initialization failed: {}", e);
            return Err(e);
        }

        run_migrations(&database.pool).await?;
        Ok(database)
    }

    /// Base schema; later columns are added by the migration steps
    async fn initialize_tables(&self) -> Result<()> {
        info!("Step 1: Creating snapshot_attempts table...");
        let attempts_table_sql = r#"
            CREATE TABLE IF NOT EXISTS snapshot_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_height INTEGER NOT NULL,
                start_time DATETIME NOT NULL,
                end_time DATETIME,
                status TEXT NOT NULL,
                error_message TEXT,
                dry_run BOOLEAN NOT NULL DEFAULT 0
            )
        "#;
        if let Err(e) = sqlx::query(attempts_table_sql).execute(&self.pool).await {
            error!("FAILED to create snapshot_attempts table: {}", e);
            return Err(e.into());
        }

        info!("Step 2: Creating target_results table...");
        let targets_table_sql = r#"
            CREATE TABLE IF NOT EXISTS target_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id INTEGER NOT NULL,
                alias TEXT NOT NULL,
                upload_prefix TEXT NOT NULL,
                start_time DATETIME NOT NULL,
                end_time DATETIME,
                status TEXT NOT NULL,
                error_message TEXT,
                dry_run BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY(attempt_id) REFERENCES snapshot_attempts(id)
            )
        "#;
        if let Err(e) = sqlx::query(targets_table_sql).execute(&self.pool).await {
            error!("FAILED to create target_results table: {}", e);
            return Err(e.into());
        }

        info!("Step 3: Creating indexes...");
        let index_statements = [
            "CREATE INDEX IF NOT EXISTS idx_attempts_block_height ON snapshot_attempts(block_height DESC)",
            "CREATE INDEX IF NOT EXISTS idx_targets_attempt ON target_results(attempt_id)",
            "CREATE INDEX IF NOT EXISTS idx_targets_alias ON target_results(alias, start_time DESC)",
        ];
        for sql in index_statements {
            if let Err(e) = sqlx::query(sql).execute(&self.pool).await {
                error!("FAILED to create index: {}", e);
                return Err(e.into());
            }
        }

        info!("Audit tables and indexes created");
        Ok(())
    }
}
