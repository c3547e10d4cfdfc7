//! Database record types (entities).
//!
//! Records serialize in camelCase because they are returned as-is by the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// One fleet-wide snapshot cycle ("run")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotAttempt {
    pub id: i64,
    pub block_height: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub dry_run: bool,
    pub deleted: bool,
    pub persisted: bool,
    pub targets: Vec<TargetResult>,
}

/// One target's contribution to an attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub id: i64,
    pub attempt_id: i64,
    pub alias: String,
    pub upload_prefix: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub dry_run: bool,
    pub deleted: bool,
    pub persisted: bool,
}

impl TargetResult {
    /// Only successful, unprotected, not yet deleted targets may have their storage removed
    pub fn is_eligible_for_deletion(&self) -> bool {
        self.status == RunStatus::Success && !self.persisted && !self.deleted
    }
}

/// Filters shared by the paginated list queries
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub include_deleted: bool,
    pub only_persisted: bool,
}

impl ListFilter {
    /// SQL predicate for the filter; always safe to append after `WHERE 1 = 1`
    pub(crate) fn sql_predicate(&self) -> &'static str {
        match (self.include_deleted, self.only_persisted) {
            (false, false) => " AND deleted = 0",
            (false, true) => " AND deleted = 0 AND persisted = 1",
            (true, false) => "",
            (true, true) => " AND persisted = 1",
        }
    }
}
