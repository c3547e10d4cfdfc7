// File: snapshotter/src/scheduler/polling.rs
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::agreement::AgreementChecker;
use crate::config::SnapshotsConfig;
use crate::constants::timing::SLOT_TIME;
use crate::database::{Database, SnapshotAttempt};
use crate::errors::Result;
use crate::fleet_status::FleetStatus;
use crate::snapshot::SnapshotLifecycle;

#[derive(Debug, Clone, Copy)]
pub struct PollingSettings {
    pub block_interval: u64,
    pub check_interval: Duration,
    pub cooldown: Duration,
    pub run_once: bool,
}

impl From<&SnapshotsConfig> for PollingSettings {
    fn from(config: &SnapshotsConfig) -> Self {
        Self {
            block_interval: config.block_interval,
            check_interval: config.check_interval(),
            cooldown: config.cooldown(),
            run_once: config.run_once,
        }
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Some target failed its checks or heights disagree
    NotSynced,
    Waiting { height: u64, blocks_left: u64 },
    Triggered {
        height: u64,
        result: Result<SnapshotAttempt>,
    },
}

pub struct PollingScheduler {
    agreement: AgreementChecker,
    lifecycle: Arc<SnapshotLifecycle>,
    db: Arc<Database>,
    status: FleetStatus,
    settings: PollingSettings,
}

impl PollingScheduler {
    pub fn new(
        agreement: AgreementChecker,
        lifecycle: Arc<SnapshotLifecycle>,
        db: Arc<Database>,
        status: FleetStatus,
        settings: PollingSettings,
    ) -> Self {
        Self {
            agreement,
            lifecycle,
            db,
            status,
            settings,
        }
    }

    /// Poll until cancelled; returns after the first triggered attempt in run-once mode
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting periodic polling every {}s (block interval {})",
            self.settings.check_interval.as_secs(),
            self.settings.block_interval
        );

        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let TickOutcome::Triggered { height, result } = self.tick().await {
                if let Err(e) = result {
                    error!("Failed to create snapshot at block {}: {}", height, e);
                }

                if self.settings.run_once {
                    info!("snapshots.run_once is true, shutting down");
                    return Ok(());
                }

                info!(
                    "Waiting {}s before resuming polling",
                    self.settings.cooldown.as_secs()
                );
                tokio::time::sleep(self.settings.cooldown).await;
                ticker.reset();
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        let started = Instant::now();
        let (synced, height) = self.agreement.check_fleet_synced().await;
        if !synced {
            return TickOutcome::NotSynced;
        }

        let interval = self.settings.block_interval;
        let left = blocks_left(height, interval);
        info!(
            "All targets are synced at block {} (next {}, {} blocks left, eta {}s, took {}ms)",
            height,
            height + left,
            left,
            left * SLOT_TIME.as_secs(),
            started.elapsed().as_millis()
        );
        self.status.record_agreed_height(height, height + left);

        let stale = match self.db.most_recent_attempt().await {
            Ok(Some(last)) if height > last.block_height.saturating_add(interval) => {
                warn!(
                    "Most recent attempt {} at block {} is too old (current {}, expected by {})",
                    last.id,
                    last.block_height,
                    height,
                    last.block_height + interval
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                error!("Failed to get most recent attempt: {}", e);
                false
            }
        };

        if left != 0 && !stale {
            return TickOutcome::Waiting {
                height,
                blocks_left: left,
            };
        }

        info!("Reached block {} to be snapshotted", height);
        TickOutcome::Triggered {
            height,
            result: self.lifecycle.run_attempt(height).await,
        }
    }
}

/// Blocks until the next multiple of `interval`; 0 when `height` is on a boundary
pub fn blocks_left(height: u64, interval: u64) -> u64 {
    if interval == 0 {
        return 0;
    }
    let remainder = height % interval;
    if remainder == 0 {
        0
    } else {
        interval - remainder
    }
}
