//! Per-target result database operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info, warn};

use super::attempts::page_window;
use super::records::{ListFilter, RunStatus, TargetResult};
use super::Database;
use crate::errors::{Result, SnapshotError};

const TARGET_COLUMNS: &str = "id, attempt_id, alias, upload_prefix, start_time, end_time, status, \
                              error_message, dry_run, deleted, persisted";

fn target_from_row(row: &SqliteRow) -> Result<TargetResult> {
    let status: String = row.try_get("status")?;
    Ok(TargetResult {
        id: row.try_get("id")?,
        attempt_id: row.try_get("attempt_id")?,
        alias: row.try_get("alias")?,
        upload_prefix: row.try_get("upload_prefix")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        status: status
            .parse()
            .map_err(|e: String| SnapshotError::Database(sqlx::Error::Decode(e.into())))?,
        error_message: row.try_get("error_message")?,
        dry_run: row.try_get("dry_run")?,
        deleted: row.try_get("deleted")?,
        persisted: row.try_get("persisted")?,
    })
}

impl Database {
    pub async fn create_target_result(
        &self,
        attempt_id: i64,
        alias: &str,
        upload_prefix: &str,
        dry_run: bool,
    ) -> Result<TargetResult> {
        let start_time = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO target_results (attempt_id, alias, upload_prefix, start_time, status, dry_run)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt_id)
        .bind(alias)
        .bind(upload_prefix)
        .bind(start_time)
        .bind(RunStatus::Running.as_str())
        .bind(dry_run)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Created target result {} for {} (attempt {})", id, alias, attempt_id);

        Ok(TargetResult {
            id,
            attempt_id,
            alias: alias.to_string(),
            upload_prefix: upload_prefix.to_string(),
            start_time,
            end_time: None,
            status: RunStatus::Running,
            error_message: None,
            dry_run,
            deleted: false,
            persisted: false,
        })
    }

    pub async fn finish_target_result(
        &self,
        target_id: i64,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE target_results
            SET status = ?, end_time = ?, error_message = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(error_message)
        .bind(target_id)
        .execute(&self.pool)
        .await?;

        debug!("Target result {} finished with status {}", target_id, status);
        Ok(())
    }

    pub async fn get_target(&self, target_id: i64) -> Result<Option<TargetResult>> {
        let sql = format!("SELECT {} FROM target_results WHERE id = ?", TARGET_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(target_from_row).transpose()
    }

    pub async fn targets_for_attempt(&self, attempt_id: i64) -> Result<Vec<TargetResult>> {
        let sql = format!(
            "SELECT {} FROM target_results WHERE attempt_id = ? ORDER BY start_time ASC, id ASC",
            TARGET_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(attempt_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(target_from_row).collect()
    }

    /// Page of one alias' results, newest first
    pub async fn targets_by_alias(
        &self,
        alias: &str,
        page: u32,
        limit: u32,
        filter: ListFilter,
    ) -> Result<Vec<TargetResult>> {
        let (offset, limit) = page_window(page, limit);
        let sql = format!(
            "SELECT {} FROM target_results WHERE alias = ?{} \
             ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?",
            TARGET_COLUMNS,
            filter.sql_predicate()
        );

        let rows = sqlx::query(&sql)
            .bind(alias)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(target_from_row).collect()
    }

    /// Atomically soft-delete a successful, unprotected target before its storage
    /// is removed. Returns false when the row is persisted, already deleted or
    /// not a successful upload, in which case storage must be left alone.
    pub async fn claim_target_for_deletion(&self, target_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE target_results SET deleted = 1
            WHERE id = ? AND persisted = 0 AND deleted = 0 AND status = 'success'
            "#,
        )
        .bind(target_id)
        .execute(&self.pool)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!("Target {} claimed for deletion: {}", target_id, claimed);
        Ok(claimed)
    }

    /// Undo a claim after the storage delete failed
    pub async fn release_target_claim(&self, target_id: i64) -> Result<()> {
        sqlx::query("UPDATE target_results SET deleted = 0 WHERE id = ?")
            .bind(target_id)
            .execute(&self.pool)
            .await?;

        debug!("Released deletion claim on target {}", target_id);
        Ok(())
    }

    /// Returns false when the target does not exist. A deleted target keeps
    /// its flag unchanged when asked to persist, its storage is already gone.
    pub async fn set_target_persisted(&self, target_id: i64, persisted: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE target_results SET persisted = ? WHERE id = ? AND (deleted = 0 OR ? = 0)",
        )
        .bind(persisted)
        .bind(target_id)
        .bind(persisted)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Target {} persisted flag set to {}", target_id, persisted);
            return Ok(true);
        }

        match self.get_target(target_id).await? {
            Some(target) => {
                warn!(
                    "Target {} ({}) is deleted, not setting persisted flag",
                    target_id, target.alias
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
