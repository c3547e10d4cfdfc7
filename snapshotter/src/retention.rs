//! Retention cleanup for uploaded snapshots.
//!
//! Keeps the newest `keep_count` unprotected successful attempts. Older ones
//! have their storage prefixes removed target by target and are then
//! soft-deleted. Anything carrying the persisted flag is never touched.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::{Database, RunStatus, SnapshotAttempt, TargetResult};
use crate::errors::{Result, SnapshotError};
use crate::storage::ObjectStore;

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub attempts_deleted: usize,
    pub targets_deleted: usize,
    /// First per-target failure; later ones are only logged
    pub first_error: Option<SnapshotError>,
}

impl CleanupReport {
    fn remember(&mut self, err: SnapshotError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

pub struct RetentionManager {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    dry_run: bool,
}

impl RetentionManager {
    pub fn new(db: Arc<Database>, store: Arc<dyn ObjectStore>, dry_run: bool) -> Self {
        Self { db, store, dry_run }
    }

    /// One best-effort cleanup pass. Only failing to read the audit store aborts it.
    pub async fn run_cleanup_cycle(&self, keep_count: usize) -> Result<CleanupReport> {
        info!("Running snapshot cleanup");
        let mut report = CleanupReport::default();

        let attempts = self.db.successful_attempts_for_cleanup().await?;
        let (persisted, unprotected): (Vec<SnapshotAttempt>, Vec<SnapshotAttempt>) =
            attempts.into_iter().partition(|a| a.persisted);

        info!(
            "Snapshot cleanup stats: {} persisted, {} non-persisted, keeping {}",
            persisted.len(),
            unprotected.len(),
            keep_count
        );

        if unprotected.len() <= keep_count {
            info!("Not enough non-persisted snapshots to clean up");
            return Ok(report);
        }

        for attempt in &unprotected[keep_count..] {
            self.process_attempt(attempt, &mut report).await;
        }

        info!(
            "Snapshot cleanup finished: {} attempts and {} targets deleted",
            report.attempts_deleted, report.targets_deleted
        );
        if let Some(e) = &report.first_error {
            warn!("Snapshot cleanup had failures, first: {}", e);
        }
        Ok(report)
    }

    async fn process_attempt(&self, attempt: &SnapshotAttempt, report: &mut CleanupReport) {
        info!(
            "Processing snapshot attempt {} (block {}) for deletion",
            attempt.id, attempt.block_height
        );

        let mut remaining = 0usize;
        for target in &attempt.targets {
            if !target.is_eligible_for_deletion() {
                continue;
            }
            match self.delete_target(target).await {
                Ok(TargetDeletion::Deleted) => report.targets_deleted += 1,
                Ok(TargetDeletion::Skipped | TargetDeletion::DryRun) => {}
                Err(e) => {
                    error!(
                        "Failed to delete target snapshot {} ({}): {}",
                        target.id, target.alias, e
                    );
                    remaining += 1;
                    report.remember(e);
                }
            }
        }

        if remaining > 0 {
            info!(
                "Attempt {} still has {} undeleted targets, keeping it",
                attempt.id, remaining
            );
            return;
        }

        if self.dry_run {
            warn!("DRY RUN: Would mark attempt {} as deleted", attempt.id);
            return;
        }

        // Operators may persist the attempt while its targets are processed
        match self.db.get_attempt(attempt.id).await {
            Ok(Some(current)) if current.persisted => {
                info!(
                    "Attempt {} was persisted during cleanup, keeping it",
                    attempt.id
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to re-read attempt {}: {}", attempt.id, e);
                report.remember(e);
                return;
            }
        }

        info!(
            "All targets of attempt {} are deleted or persisted, marking it deleted",
            attempt.id
        );
        match self.db.mark_attempt_deleted(attempt.id).await {
            Ok(()) => report.attempts_deleted += 1,
            Err(e) => {
                error!("Failed to mark attempt {} as deleted: {}", attempt.id, e);
                report.remember(e);
            }
        }
    }

    /// Claims the row before touching storage, so a target persisted after the
    /// cycle started is never removed.
    async fn delete_target(&self, target: &TargetResult) -> Result<TargetDeletion> {
        let bucket = self.store.bucket_name();
        if bucket.is_empty() {
            warn!("No bucket name configured, skipping deletion of {}", target.alias);
            return Err(SnapshotError::Storage(
                "bucket name not configured in S3 settings".to_string(),
            ));
        }

        if self.dry_run {
            let current = self.current_target(target).await?;
            if current.persisted || current.deleted {
                return Ok(TargetDeletion::Skipped);
            }
            ensure_deletable(&current)?;
            warn!(
                "DRY RUN: Would delete target snapshot files {}/{}",
                bucket, target.upload_prefix
            );
            return Ok(TargetDeletion::DryRun);
        }

        if !self.db.claim_target_for_deletion(target.id).await? {
            let current = self.current_target(target).await?;
            if current.persisted {
                info!(
                    "Target snapshot {} ({}) was persisted during cleanup, keeping it",
                    target.id, target.alias
                );
                return Ok(TargetDeletion::Skipped);
            }
            if current.deleted {
                return Ok(TargetDeletion::Skipped);
            }
            ensure_deletable(&current)?;
            return Err(SnapshotError::Storage(format!(
                "could not claim target {} for deletion",
                target.id
            )));
        }

        info!(
            "Deleting target snapshot files of {} under {}/{} (endpoint {}, region {})",
            target.alias,
            bucket,
            target.upload_prefix,
            self.store.endpoint(),
            self.store.region()
        );

        match self.store.delete_prefix(&target.upload_prefix).await {
            Ok(removed) => {
                info!(
                    "Deleted target snapshot {} ({}): {} objects",
                    target.id, target.alias, removed
                );
                Ok(TargetDeletion::Deleted)
            }
            Err(e) => {
                if let Err(db_err) = self.db.release_target_claim(target.id).await {
                    error!(
                        "Failed to release deletion claim on target {}: {}",
                        target.id, db_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn current_target(&self, target: &TargetResult) -> Result<TargetResult> {
        self.db
            .get_target(target.id)
            .await?
            .ok_or_else(|| SnapshotError::Database(sqlx::Error::RowNotFound))
    }
}

enum TargetDeletion {
    Deleted,
    Skipped,
    DryRun,
}

/// Persisted or failed targets must never reach storage deletion
fn ensure_deletable(target: &TargetResult) -> Result<()> {
    if target.persisted {
        return Err(SnapshotError::PersistenceInvariantRisk {
            record: format!("target {} ({})", target.id, target.alias),
        });
    }
    if target.status != RunStatus::Success {
        return Err(SnapshotError::Storage(format!(
            "target {} has status {}, only successful uploads are deleted",
            target.id, target.status
        )));
    }
    Ok(())
}
