//! Error types for the snapshotter
//!
//! Every failure the orchestrator can hit maps onto one of these variants.
//! Per-target failures always carry the target alias so they can be copied
//! verbatim into the audit record.

use thiserror::Error;

/// Main error type for snapshot orchestration
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Transport or authentication failure talking to a target
    #[error("target {target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// Target reports a different chain than the fleet is configured for
    #[error("chain id mismatch on {target}: expected {expected}, got {actual}")]
    ProtocolMismatch {
        target: String,
        expected: String,
        actual: String,
    },

    /// A remote command ran but failed or produced output we cannot parse
    #[error("remote command failed on {target}: {reason}")]
    RemoteCommand { target: String, reason: String },

    /// Targets do not agree on the block height
    #[error("targets disagree on block height: {detail}")]
    Disagreement { detail: String },

    /// Admission control rejected a second concurrent attempt
    #[error("there's already a snapshot in progress")]
    AlreadyInProgress,

    /// Some targets failed to upload; their results are recorded individually
    #[error("upload failed for {} target(s): {}", failed_targets.len(), failed_targets.join(", "))]
    PartialUploadFailure { failed_targets: Vec<String> },

    /// Object storage operation failed
    #[error("storage error: {0}")]
    Storage(String),

    /// A code path tried to delete data protected by the persisted flag
    #[error("refusing to delete persisted {record}")]
    PersistenceInvariantRisk { record: String },

    /// Audit store failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SnapshotError {
    pub fn unreachable(target: &str, reason: impl ToString) -> Self {
        SnapshotError::Unreachable {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn remote_command(target: &str, reason: impl ToString) -> Self {
        SnapshotError::RemoteCommand {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that abort process startup rather than a single attempt
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            SnapshotError::Unreachable { .. }
                | SnapshotError::ProtocolMismatch { .. }
                | SnapshotError::Config(_)
                | SnapshotError::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
