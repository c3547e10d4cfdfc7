// File: snapshotter/src/scheduler/cleanup.rs
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument};

use crate::config::CleanupConfig;
use crate::retention::RetentionManager;

/// Keeps the background cleanup alive; dropping it does not stop running jobs
pub enum CleanupHandle {
    Disabled,
    Interval(JoinHandle<()>),
    Cron(JobScheduler),
}

pub struct CleanupScheduler {
    retention: Arc<RetentionManager>,
    config: CleanupConfig,
}

impl CleanupScheduler {
    pub fn new(retention: Arc<RetentionManager>, config: CleanupConfig) -> Self {
        Self { retention, config }
    }

    /// Run one cycle right away, then on the cron schedule or every `check_interval_hours`
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<CleanupHandle> {
        if !self.config.enabled {
            info!("Snapshot cleanup is disabled");
            return Ok(CleanupHandle::Disabled);
        }

        let keep_count = self.config.effective_keep_count();

        match &self.config.schedule {
            Some(schedule) => {
                validate_6_field_cron(schedule)
                    .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;

                let scheduler = JobScheduler::new()
                    .await
                    .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

                let retention = self.retention.clone();
                let job = Job::new_async(schedule.as_str(), move |_uuid, _scheduler| {
                    let retention = retention.clone();
                    Box::pin(async move {
                        info!("Executing scheduled snapshot cleanup");
                        run_cycle(&retention, keep_count).await;
                    })
                })
                .map_err(|e| anyhow!("Failed to create cleanup job for '{}': {}", schedule, e))?;

                scheduler
                    .add(job)
                    .await
                    .map_err(|e| anyhow!("Failed to add cleanup job to scheduler: {}", e))?;

                let retention = self.retention.clone();
                tokio::spawn(async move { run_cycle(&retention, keep_count).await });

                scheduler
                    .start()
                    .await
                    .map_err(|e| anyhow!("Failed to start cleanup scheduler: {}", e))?;

                info!(
                    "Snapshot cleanup scheduled with '{}' (keep count {})",
                    schedule, keep_count
                );
                Ok(CleanupHandle::Cron(scheduler))
            }
            None => {
                let interval = self.config.effective_interval();
                info!(
                    "Starting snapshot cleanup routine (keep count {}, every {}h)",
                    keep_count,
                    interval.as_secs() / 3600
                );
                let retention = self.retention.clone();
                Ok(CleanupHandle::Interval(tokio::spawn(async move {
                    interval_loop(retention, keep_count, interval).await
                })))
            }
        }
    }
}

async fn interval_loop(retention: Arc<RetentionManager>, keep_count: usize, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        // first tick completes immediately
        ticker.tick().await;
        run_cycle(&retention, keep_count).await;
    }
}

async fn run_cycle(retention: &RetentionManager, keep_count: usize) {
    match retention.run_cleanup_cycle(keep_count).await {
        Ok(report) => {
            if let Some(e) = report.first_error {
                error!("Snapshot cleanup finished with errors: {}", e);
            }
        }
        Err(e) => error!("Failed to cleanup snapshots: {}", e),
    }
}

pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(anyhow!(
            "tokio-cron-scheduler requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields: '{}'",
            parts.len(),
            schedule
        ));
    }

    validate_cron_field(parts[0], "second", 0, 59)?;
    validate_cron_field(parts[1], "minute", 0, 59)?;
    validate_cron_field(parts[2], "hour", 0, 23)?;
    validate_cron_field(parts[3], "day", 1, 31)?;
    validate_cron_field(parts[4], "month", 1, 12)?;
    validate_cron_field(parts[5], "dayofweek", 0, 7)?;

    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<()> {
    if field == "*" || field == "?" {
        return Ok(());
    }

    if let Some(step) = field.strip_prefix("*/") {
        let step = step
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid {} step value: {}", name, step))?;
        if step == 0 {
            return Err(anyhow!("{} step value cannot be 0", name));
        }
        return Ok(());
    }

    let in_range = |value: &str| -> Result<u32> {
        let parsed = value
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value))?;
        if parsed < min || parsed > max {
            return Err(anyhow!(
                "{} value {} is outside valid range {}-{}",
                name,
                parsed,
                min,
                max
            ));
        }
        Ok(parsed)
    };

    for part in field.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (in_range(start)?, in_range(end)?);
                if start > end {
                    return Err(anyhow!("{} range {}-{} is reversed", name, start, end));
                }
            }
            None => {
                in_range(part)?;
            }
        }
    }

    Ok(())
}
