//! Snapshot attempt ("run") database operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error, info, warn};

use super::records::{ListFilter, RunStatus, SnapshotAttempt};
use super::Database;
use crate::constants::limits::MAX_PAGE_SIZE;
use crate::errors::{Result, SnapshotError};

const ATTEMPT_COLUMNS: &str = "id, block_height, start_time, end_time, status, error_message, \
                               dry_run, deleted, persisted";

fn attempt_from_row(row: &SqliteRow) -> Result<SnapshotAttempt> {
    let status: String = row.try_get("status")?;
    let block_height: i64 = row.try_get("block_height")?;
    Ok(SnapshotAttempt {
        id: row.try_get("id")?,
        block_height: block_height as u64,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        status: status
            .parse()
            .map_err(|e: String| SnapshotError::Database(sqlx::Error::Decode(e.into())))?,
        error_message: row.try_get("error_message")?,
        dry_run: row.try_get("dry_run")?,
        deleted: row.try_get("deleted")?,
        persisted: row.try_get("persisted")?,
        targets: Vec::new(),
    })
}

/// Clamp user-supplied pagination into (offset, limit)
pub(crate) fn page_window(page: u32, limit: u32) -> (i64, i64) {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let page = page.max(1);
    (((page - 1) as i64) * limit as i64, limit as i64)
}

impl Database {
    /// Insert a new attempt in the `running` state
    pub async fn create_attempt(&self, block_height: u64, dry_run: bool) -> Result<SnapshotAttempt> {
        let start_time = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO snapshot_attempts (block_height, start_time, status, dry_run)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(block_height as i64)
        .bind(start_time)
        .bind(RunStatus::Running.as_str())
        .bind(dry_run)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create attempt for block {}: {}", block_height, e);
            e
        })?;

        let id = result.last_insert_rowid();
        info!("Created snapshot attempt {} at block {}", id, block_height);

        Ok(SnapshotAttempt {
            id,
            block_height,
            start_time,
            end_time: None,
            status: RunStatus::Running,
            error_message: None,
            dry_run,
            deleted: false,
            persisted: false,
            targets: Vec::new(),
        })
    }

    /// Move a running attempt to its terminal status; a second call is ignored
    pub async fn finish_attempt(
        &self,
        attempt_id: i64,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE snapshot_attempts
            SET status = ?, end_time = ?, error_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("Attempt {} was not running, status left unchanged", attempt_id);
        } else {
            debug!("Attempt {} finished with status {}", attempt_id, status);
        }
        Ok(())
    }

    /// Attempt with its targets ordered by start time
    pub async fn get_attempt(&self, attempt_id: i64) -> Result<Option<SnapshotAttempt>> {
        let sql = format!("SELECT {} FROM snapshot_attempts WHERE id = ?", ATTEMPT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut attempt = attempt_from_row(&row)?;
                attempt.targets = self.targets_for_attempt(attempt.id).await?;
                Ok(Some(attempt))
            }
            None => {
                debug!("No attempt found with ID: {}", attempt_id);
                Ok(None)
            }
        }
    }

    /// Newest attempt regardless of status or flags
    pub async fn most_recent_attempt(&self) -> Result<Option<SnapshotAttempt>> {
        let sql = format!(
            "SELECT {} FROM snapshot_attempts ORDER BY start_time DESC, id DESC LIMIT 1",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let mut attempt = attempt_from_row(&row)?;
                attempt.targets = self.targets_for_attempt(attempt.id).await?;
                Ok(Some(attempt))
            }
            None => Ok(None),
        }
    }

    /// Page of attempts, newest first
    pub async fn list_attempts(
        &self,
        page: u32,
        limit: u32,
        filter: ListFilter,
    ) -> Result<Vec<SnapshotAttempt>> {
        let (offset, limit) = page_window(page, limit);
        let sql = format!(
            "SELECT {} FROM snapshot_attempts WHERE 1 = 1{} \
             ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?",
            ATTEMPT_COLUMNS,
            filter.sql_predicate()
        );

        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut attempt = attempt_from_row(row)?;
            attempt.targets = self.targets_for_attempt(attempt.id).await?;
            attempts.push(attempt);
        }
        Ok(attempts)
    }

    /// Successful, non-deleted attempts ordered by block height descending
    pub async fn successful_attempts_for_cleanup(&self) -> Result<Vec<SnapshotAttempt>> {
        let sql = format!(
            "SELECT {} FROM snapshot_attempts \
             WHERE status = 'success' AND deleted = 0 \
             ORDER BY block_height DESC, id DESC",
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut attempt = attempt_from_row(row)?;
            attempt.targets = self.targets_for_attempt(attempt.id).await?;
            attempts.push(attempt);
        }
        Ok(attempts)
    }

    /// Soft-delete an attempt and its non-persisted targets
    pub async fn mark_attempt_deleted(&self, attempt_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE snapshot_attempts SET deleted = 1 WHERE id = ? AND persisted = 0")
                .bind(attempt_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            let row = sqlx::query("SELECT persisted FROM snapshot_attempts WHERE id = ?")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await?;
            return match row {
                Some(row) if row.try_get::<bool, _>("persisted")? => {
                    Err(SnapshotError::PersistenceInvariantRisk {
                        record: format!("attempt {}", attempt_id),
                    })
                }
                _ => Ok(()),
            };
        }

        sqlx::query("UPDATE target_results SET deleted = 1 WHERE attempt_id = ? AND persisted = 0")
            .bind(attempt_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Attempt {} marked deleted", attempt_id);
        Ok(())
    }

    /// Set or clear the persisted flag on an attempt, cascading to its targets.
    /// Returns false when the attempt does not exist. Deleted attempts cannot be persisted.
    pub async fn set_attempt_persisted(&self, attempt_id: i64, persisted: bool) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE snapshot_attempts SET persisted = ? WHERE id = ? AND (deleted = 0 OR ? = 0)",
        )
        .bind(persisted)
        .bind(attempt_id)
        .bind(persisted)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT id FROM snapshot_attempts WHERE id = ?")
                .bind(attempt_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if exists {
                warn!("Attempt {} is deleted, not setting persisted flag", attempt_id);
            }
            return Ok(exists);
        }

        // Targets already claimed by cleanup have no storage left to protect
        sqlx::query(
            "UPDATE target_results SET persisted = ? WHERE attempt_id = ? AND (deleted = 0 OR ? = 0)",
        )
        .bind(persisted)
        .bind(attempt_id)
        .bind(persisted)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("Attempt {} persisted flag set to {}", attempt_id, persisted);
        Ok(true)
    }
}
