//! Fleet-wide agreement probes.
//!
//! A fleet is only snapshotted when every target is healthy and every target
//! reports exactly the same execution block height. One flaky host fails the
//! whole fleet.

use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::constants::limits::MAX_SYNC_DISTANCE;
use crate::errors::{Result, SnapshotError};
use crate::remote::{parse_hex_quantity, RemoteHost, SyncStatus};

/// Outcome of probing one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProbe {
    pub alias: String,
    pub healthy: bool,
    pub height: Option<u64>,
}

pub struct AgreementChecker {
    hosts: Vec<Arc<dyn RemoteHost>>,
}

impl AgreementChecker {
    pub fn new(hosts: Vec<Arc<dyn RemoteHost>>) -> Self {
        Self { hosts }
    }

    /// Returns `(true, height)` only when every target passes its checks and all
    /// heights are equal; otherwise `(false, 0)`.
    pub async fn check_fleet_synced(&self) -> (bool, u64) {
        if self.hosts.is_empty() {
            return (false, 0);
        }

        let probes = join_all(self.hosts.iter().map(|host| probe_host(host.as_ref()))).await;
        let (synced, height) = fleet_verdict(&probes);

        if synced {
            debug!("All {} targets synced at block {}", probes.len(), height);
        }
        (synced, height)
    }

    /// Authoritative height re-check: every target must answer and agree
    #[instrument(skip(self))]
    pub async fn verify_heights_agree(&self) -> Result<u64> {
        let heights = try_join_all(self.hosts.iter().map(|host| async move {
            let height = host.execution_block_height().await?;
            Ok::<_, SnapshotError>((host.alias().to_string(), height))
        }))
        .await?;

        let values: Vec<u64> = heights.iter().map(|(_, h)| *h).collect();
        match unanimous_height(&values) {
            Some(height) => {
                info!("All target ELs are at the same block {}", height);
                Ok(height)
            }
            None => {
                let detail = heights
                    .iter()
                    .map(|(alias, h)| format!("{}={}", alias, h))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(SnapshotError::Disagreement { detail })
            }
        }
    }

    /// Every target must report the configured chain id; hex and decimal forms are equivalent
    pub async fn verify_chain_ids(&self, expected: &str) -> Result<()> {
        let reported = try_join_all(self.hosts.iter().map(|host| async move {
            let chain_id = host.chain_id().await?;
            Ok::<_, SnapshotError>((host.alias().to_string(), chain_id))
        }))
        .await?;

        for (alias, actual) in reported {
            if !chain_ids_match(expected, &actual) {
                return Err(SnapshotError::ProtocolMismatch {
                    target: alias,
                    expected: expected.to_string(),
                    actual,
                });
            }
            info!("Target {} reports expected chain id {}", alias, actual);
        }
        Ok(())
    }
}

async fn probe_host(host: &dyn RemoteHost) -> HostProbe {
    let alias = host.alias().to_string();
    let (cl_status, el_syncing, height) = tokio::join!(
        host.sync_status(),
        host.execution_syncing(),
        host.execution_block_height()
    );

    let cl_ok = match cl_status {
        Ok(status) => consensus_ready(&alias, &status),
        Err(e) => {
            warn!("Failed getting CL sync status on {}: {}", alias, e);
            false
        }
    };

    let el_ok = match el_syncing {
        Ok(false) => true,
        Ok(true) => {
            warn!("EL on {} is still syncing", alias);
            false
        }
        Err(e) => {
            warn!("Failed getting EL sync status on {}: {}", alias, e);
            false
        }
    };

    let height = match height {
        Ok(h) => Some(h),
        Err(e) => {
            warn!("Failed getting EL block on {}: {}", alias, e);
            None
        }
    };

    HostProbe {
        healthy: cl_ok && el_ok,
        alias,
        height,
    }
}

fn consensus_ready(alias: &str, status: &SyncStatus) -> bool {
    let ready = !status.is_syncing
        && !status.is_optimistic
        && !status.el_offline
        && status.sync_distance <= MAX_SYNC_DISTANCE;
    if !ready {
        warn!(
            "CL on {} not ready (syncing: {}, optimistic: {}, el_offline: {}, distance: {})",
            alias, status.is_syncing, status.is_optimistic, status.el_offline, status.sync_distance
        );
    }
    ready
}

/// Reduce per-target probes into the fleet verdict
pub fn fleet_verdict(probes: &[HostProbe]) -> (bool, u64) {
    if probes.is_empty() || probes.iter().any(|p| !p.healthy) {
        return (false, 0);
    }

    let mut heights = Vec::with_capacity(probes.len());
    for probe in probes {
        match probe.height {
            Some(h) => heights.push(h),
            None => return (false, 0),
        }
    }

    match unanimous_height(&heights) {
        Some(height) => (true, height),
        None => {
            let detail = probes
                .iter()
                .map(|p| format!("{}={}", p.alias, p.height.unwrap_or_default()))
                .collect::<Vec<_>>()
                .join(", ");
            warn!("Targets disagree on block height: {}", detail);
            (false, 0)
        }
    }
}

/// The common value when every height is identical
pub fn unanimous_height(heights: &[u64]) -> Option<u64> {
    let first = *heights.first()?;
    heights.iter().all(|h| *h == first).then_some(first)
}

fn parse_chain_id(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    parse_hex_quantity(trimmed).or_else(|| trimmed.parse().ok())
}

pub fn chain_ids_match(expected: &str, actual: &str) -> bool {
    match (parse_chain_id(expected), parse_chain_id(actual)) {
        (Some(a), Some(b)) => a == b,
        _ => expected.trim().eq_ignore_ascii_case(actual.trim()),
    }
}
