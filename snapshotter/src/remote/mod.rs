// File: snapshotter/src/remote/mod.rs

pub mod node;
pub mod ssh;

pub use node::NodeHost;
pub use ssh::SshSession;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::TargetConfig;
use crate::errors::Result;

/// Executes shell commands on one remote machine.
///
/// Implementations return stdout on a zero exit status. Transport failures
/// map to `SnapshotError::Unreachable`, failing commands to `RemoteCommand`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String>;
}

/// Everything the orchestrator needs from one target node
#[async_trait]
pub trait RemoteHost: Send + Sync {
    fn target(&self) -> &TargetConfig;

    fn alias(&self) -> &str {
        &self.target().alias
    }

    /// Chain identifier reported by the execution client, as returned (usually hex)
    async fn chain_id(&self) -> Result<String>;

    /// Consensus client sync state
    async fn sync_status(&self) -> Result<SyncStatus>;

    /// Whether the execution client reports an in-progress sync
    async fn execution_syncing(&self) -> Result<bool>;

    async fn execution_block_height(&self) -> Result<u64>;

    /// Stop a container; `force` skips the graceful shutdown period
    async fn stop_service(&self, name: &str, force: bool) -> Result<()>;

    async fn start_service(&self, name: &str) -> Result<()>;

    /// POST a JSON-RPC payload to the execution client and write `.result` to `path`
    async fn dump_rpc_response_to_file(&self, payload: &str, path: &str) -> Result<()>;

    /// Write the metadata sidecar into `source_dir`, then ship the directory to
    /// `{destination_prefix}/{block_height}` in object storage. Performs no retry.
    async fn sync_and_upload_directory(
        &self,
        source_dir: &str,
        destination_prefix: &str,
        block_height: u64,
    ) -> Result<()>;
}

/// `/eth/v1/node/syncing` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    #[serde(default)]
    pub is_optimistic: bool,
    #[serde(default)]
    pub el_offline: bool,
    #[serde(deserialize_with = "u64_from_quantity")]
    pub head_slot: u64,
    #[serde(deserialize_with = "u64_from_quantity")]
    pub sync_distance: u64,
}

// Beacon API encodes integers as decimal strings
fn u64_from_quantity<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Text(String),
        Number(u64),
    }

    match Quantity::deserialize(deserializer)? {
        Quantity::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Quantity::Number(n) => Ok(n),
    }
}

/// Decode an `0x`-prefixed JSON-RPC quantity
pub fn parse_hex_quantity(value: &str) -> Option<u64> {
    let trimmed = value.trim().trim_matches('"');
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Single-quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
