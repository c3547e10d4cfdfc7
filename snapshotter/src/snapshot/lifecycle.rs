// File: snapshotter/src/snapshot/lifecycle.rs
use futures::future::{join_all, try_join_all};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::agreement::AgreementChecker;
use crate::config::SnapshotsConfig;
use crate::constants::{files, rpc};
use crate::database::{Database, RunStatus, SnapshotAttempt};
use crate::errors::{Result, SnapshotError};
use crate::fleet_status::{FleetStatus, Phase};
use crate::remote::RemoteHost;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub dry_run: bool,
    pub settle_delay: Duration,
    pub dry_run_delay: Duration,
}

impl From<&SnapshotsConfig> for LifecycleSettings {
    fn from(config: &SnapshotsConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            settle_delay: config.settle_delay(),
            dry_run_delay: config.dry_run_delay(),
        }
    }
}

pub struct SnapshotLifecycle {
    hosts: Vec<Arc<dyn RemoteHost>>,
    agreement: AgreementChecker,
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    status: FleetStatus,
    settings: LifecycleSettings,
}

impl SnapshotLifecycle {
    pub fn new(
        hosts: Vec<Arc<dyn RemoteHost>>,
        db: Arc<Database>,
        store: Arc<dyn ObjectStore>,
        status: FleetStatus,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            agreement: AgreementChecker::new(hosts.clone()),
            hosts,
            db,
            store,
            status,
            settings,
        }
    }

    /// Run one complete attempt at `block_height`.
    ///
    /// Fails with `AlreadyInProgress` without touching the store when another
    /// attempt holds the gate. Any other failure is recorded on the attempt
    /// before it is returned.
    #[instrument(skip(self))]
    pub async fn run_attempt(&self, block_height: u64) -> Result<SnapshotAttempt> {
        let _guard = self.status.try_begin_attempt()?;
        let started = Instant::now();

        let attempt = self
            .db
            .create_attempt(block_height, self.settings.dry_run)
            .await?;
        info!(
            "Starting snapshot attempt {} at block {} across {} targets (dry run: {})",
            attempt.id,
            block_height,
            self.hosts.len(),
            self.settings.dry_run
        );

        let outcome = match self.drive(attempt.id, block_height).await {
            Ok(()) => self
                .db
                .finish_attempt(attempt.id, RunStatus::Success, None)
                .await
                .inspect_err(|e| {
                    error!("Failed to record success of attempt {}: {}", attempt.id, e)
                }),
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => {
                self.status.set_phase(Phase::Success);
                info!(
                    "Snapshot attempt {} at block {} succeeded in {}s",
                    attempt.id,
                    block_height,
                    started.elapsed().as_secs()
                );
            }
            Err(e) => {
                self.status.set_phase(Phase::Failed);
                let message = e.to_string();
                if let Err(db_err) = self
                    .db
                    .finish_attempt(attempt.id, RunStatus::Failed, Some(&message))
                    .await
                {
                    error!("Failed to record failure of attempt {}: {}", attempt.id, db_err);
                }
                error!("Snapshot attempt {} failed: {}", attempt.id, message);
            }
        }

        outcome?;
        self.db
            .get_attempt(attempt.id)
            .await?
            .ok_or_else(|| SnapshotError::Database(sqlx::Error::RowNotFound))
    }

    async fn drive(&self, attempt_id: i64, block_height: u64) -> Result<()> {
        let dry_run = self.settings.dry_run;

        if dry_run {
            warn!("Dry run mode enabled - skipping pre snapshot sequence");
        } else {
            self.status.set_phase(Phase::Preparing);
            self.prepare(block_height).await?;
        }

        self.status.set_phase(Phase::Uploading);
        let failed_targets = self.upload_all(attempt_id, block_height).await;

        // Only a complete, real upload may move the marker
        let marker = if failed_targets.is_empty() && !dry_run {
            self.write_latest_marker(block_height).await
        } else {
            Ok(())
        };

        if dry_run {
            warn!("Dry run mode enabled - skipping post snapshot sequence");
        } else {
            self.status.set_phase(Phase::Restoring);
            self.restore().await?;
        }

        if !failed_targets.is_empty() {
            return Err(SnapshotError::PartialUploadFailure { failed_targets });
        }
        marker
    }

    async fn prepare(&self, block_height: u64) -> Result<()> {
        self.across_targets("stopping sidecar", |host| async move {
            let name = host.target().containers.sidecar.clone();
            host.stop_service(&name, true).await
        })
        .await?;

        info!(
            "Waiting {}s for in-flight writes to settle",
            self.settings.settle_delay.as_secs()
        );
        tokio::time::sleep(self.settings.settle_delay).await;

        let verified = self.agreement.verify_heights_agree().await?;
        if verified != block_height {
            warn!(
                "Fleet advanced from block {} to {} before quiescing; snapshot keeps block {}",
                block_height, verified, block_height
            );
        }

        info!("Dumping snapshot metadata to files");
        self.across_targets("dumping RPC snapshots", |host| async move {
            let data_dir = host.target().data_dir.clone();
            host.dump_rpc_response_to_file(
                rpc::LATEST_BLOCK,
                &format!("{}/{}", data_dir, files::LATEST_BLOCK),
            )
            .await?;
            host.dump_rpc_response_to_file(
                rpc::CLIENT_VERSION,
                &format!("{}/{}", data_dir, files::CLIENT_VERSION),
            )
            .await
        })
        .await?;

        self.across_targets("stopping EL", |host| async move {
            let name = host.target().containers.execution.clone();
            host.stop_service(&name, false).await
        })
        .await
    }

    async fn restore(&self) -> Result<()> {
        self.across_targets("starting sidecar", |host| async move {
            let name = host.target().containers.sidecar.clone();
            host.start_service(&name).await
        })
        .await?;

        self.across_targets("starting EL", |host| async move {
            let name = host.target().containers.execution.clone();
            host.start_service(&name).await
        })
        .await?;

        self.across_targets("restarting CL", |host| async move {
            let name = host.target().containers.consensus.clone();
            host.stop_service(&name, false).await?;
            host.start_service(&name).await
        })
        .await
    }

    /// Run `op` on every target concurrently; the first error fails the step
    async fn across_targets<F, Fut>(&self, step: &str, op: F) -> Result<()>
    where
        F: Fn(Arc<dyn RemoteHost>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!("{} across targets", step);
        try_join_all(self.hosts.iter().cloned().map(|host| {
            let alias = host.alias().to_string();
            let fut = op(host);
            async move {
                fut.await.map_err(|e| {
                    error!("{} failed on {}: {}", step, alias, e);
                    e
                })
            }
        }))
        .await?;
        info!("Finished {} across targets", step);
        Ok(())
    }

    /// Upload every target; returns the aliases that failed
    async fn upload_all(&self, attempt_id: i64, block_height: u64) -> Vec<String> {
        info!("Starting uploading data snapshots");
        let started = Instant::now();

        let results = join_all(
            self.hosts
                .iter()
                .map(|host| self.upload_target(host.as_ref(), attempt_id, block_height)),
        )
        .await;

        let failed: Vec<String> = results.into_iter().flatten().collect();
        info!(
            "Finished uploading all data snapshots in {}s ({} failed)",
            started.elapsed().as_secs(),
            failed.len()
        );
        failed
    }

    /// Returns the alias when this target's upload failed
    async fn upload_target(
        &self,
        host: &dyn RemoteHost,
        attempt_id: i64,
        block_height: u64,
    ) -> Option<String> {
        let target = host.target();
        let upload_prefix = format!("{}/{}", target.upload_prefix, block_height);

        let record = match self
            .db
            .create_target_result(attempt_id, &target.alias, &upload_prefix, self.settings.dry_run)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to create target result for {}: {}", target.alias, e);
                return Some(target.alias.clone());
            }
        };

        let outcome = if self.settings.dry_run {
            warn!(
                "Dry run mode enabled - skipping upload of {} to {}, marking success after {}s",
                target.alias,
                upload_prefix,
                self.settings.dry_run_delay.as_secs()
            );
            tokio::time::sleep(self.settings.dry_run_delay).await;
            Ok(())
        } else {
            host.sync_and_upload_directory(&target.data_dir, &target.upload_prefix, block_height)
                .await
        };

        let (status, message) = match &outcome {
            Ok(()) => {
                info!("Uploaded data snapshot of {} to {}", target.alias, upload_prefix);
                (RunStatus::Success, None)
            }
            Err(e) => {
                error!("Could not upload snapshot of {}: {}", target.alias, e);
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        if let Err(e) = self
            .db
            .finish_target_result(record.id, status, message.as_deref())
            .await
        {
            error!("Failed to update target result {}: {}", record.id, e);
        }

        outcome.err().map(|_| target.alias.clone())
    }

    async fn write_latest_marker(&self, block_height: u64) -> Result<()> {
        let key = format!("{}{}", self.store.root_prefix(), files::LATEST_MARKER);
        self.store
            .put_object(&key, block_height.to_string().into_bytes())
            .await?;
        info!("Updated latest marker {} to block {}", key, block_height);
        Ok(())
    }
}
