//! In-memory fleet status shared by the scheduler, the lifecycle and the API
//!
//! Tracks the last agreed block height, the next snapshot height and the single
//! "attempt in progress" gate. The gate is taken with [`FleetStatus::try_begin_attempt`]
//! and released when the returned [`AttemptGuard`] drops, including on error
//! paths and panics.
//!
//! # Usage
//!
//! ```ignore
//! let _guard = status.try_begin_attempt()?; // AlreadyInProgress if busy
//! status.set_phase(Phase::Preparing);
//! // ... run the attempt ...
//! status.set_phase(Phase::Success);
//! // guard dropped here: flag cleared, Success stays visible
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument};

use crate::errors::{Result, SnapshotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Preparing,
    Uploading,
    Restoring,
    Success,
    Failed,
}

/// Point-in-time copy served by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatusSnapshot {
    pub block_interval: u64,
    pub processed_block_height: u64,
    pub next_period_snapshot_block_height: u64,
    pub snapshot_in_progress: bool,
    pub phase: Phase,
    pub attempt_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    block_interval: u64,
    processed_block_height: u64,
    next_period_snapshot_block_height: u64,
    in_progress: bool,
    phase: Phase,
    attempt_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FleetStatus {
    inner: Arc<Mutex<Inner>>,
}

impl FleetStatus {
    pub fn new(block_interval: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                block_interval,
                processed_block_height: 0,
                next_period_snapshot_block_height: 0,
                in_progress: false,
                phase: Phase::Idle,
                attempt_started_at: None,
            })),
        }
    }

    // Held only for a field read/write, never across an await
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> FleetStatusSnapshot {
        let inner = self.lock();
        FleetStatusSnapshot {
            block_interval: inner.block_interval,
            processed_block_height: inner.processed_block_height,
            next_period_snapshot_block_height: inner.next_period_snapshot_block_height,
            snapshot_in_progress: inner.in_progress,
            phase: inner.phase,
            attempt_started_at: inner.attempt_started_at,
        }
    }

    pub fn record_agreed_height(&self, height: u64, next_snapshot_height: u64) {
        let mut inner = self.lock();
        inner.processed_block_height = height;
        inner.next_period_snapshot_block_height = next_snapshot_height;
    }

    pub fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
    }

    pub fn is_attempt_in_progress(&self) -> bool {
        self.lock().in_progress
    }

    /// Take the admission gate or fail with `AlreadyInProgress`
    #[instrument(skip(self))]
    pub fn try_begin_attempt(&self) -> Result<AttemptGuard> {
        let mut inner = self.lock();
        if inner.in_progress {
            return Err(SnapshotError::AlreadyInProgress);
        }
        inner.in_progress = true;
        inner.phase = Phase::Idle;
        inner.attempt_started_at = Some(Utc::now());
        info!("Snapshot attempt admitted");

        Ok(AttemptGuard {
            status: self.clone(),
        })
    }
}

/// Releases the admission gate on drop
#[derive(Debug)]
pub struct AttemptGuard {
    status: FleetStatus,
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let mut inner = self.status.lock();
        inner.in_progress = false;
        inner.attempt_started_at = None;
        // The outcome stays visible until the next attempt is admitted
        inner.phase = match inner.phase {
            Phase::Preparing | Phase::Uploading | Phase::Restoring => Phase::Failed,
            terminal => terminal,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_attempt_rejected_until_guard_drops() {
        let status = FleetStatus::new(1000);
        let guard = status.try_begin_attempt().unwrap();
        assert!(status.snapshot().snapshot_in_progress);
        assert!(matches!(
            status.try_begin_attempt(),
            Err(SnapshotError::AlreadyInProgress)
        ));

        drop(guard);
        assert!(!status.snapshot().snapshot_in_progress);
        assert!(status.try_begin_attempt().is_ok());
    }

    #[test]
    fn test_terminal_phase_survives_guard_release() {
        let status = FleetStatus::new(1000);
        {
            let _guard = status.try_begin_attempt().unwrap();
            status.set_phase(Phase::Uploading);
            assert_eq!(status.snapshot().phase, Phase::Uploading);
            status.set_phase(Phase::Success);
        }
        assert_eq!(status.snapshot().phase, Phase::Success);

        // Admitting the next attempt clears the previous outcome
        let _guard = status.try_begin_attempt().unwrap();
        assert_eq!(status.snapshot().phase, Phase::Idle);
    }

    #[test]
    fn test_interrupted_phase_reported_as_failed() {
        let status = FleetStatus::new(1000);
        {
            let _guard = status.try_begin_attempt().unwrap();
            status.set_phase(Phase::Restoring);
        }
        assert_eq!(status.snapshot().phase, Phase::Failed);
        assert!(status.snapshot().attempt_started_at.is_none());
    }

    #[test]
    fn test_gate_released_after_panic() {
        let status = FleetStatus::new(1000);
        let cloned = status.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_begin_attempt().unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!status.is_attempt_in_progress());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let status = FleetStatus::new(1000);
        status.record_agreed_height(1000, 2000);
        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["processedBlockHeight"], 1000);
        assert_eq!(json["nextPeriodSnapshotBlockHeight"], 2000);
        assert_eq!(json["snapshotInProgress"], false);
        assert_eq!(json["phase"], "idle");
    }
}
