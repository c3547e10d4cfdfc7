//! Background loops
//!
//! - **Polling**: every `check_interval_seconds`, probe the fleet and trigger a
//!   snapshot when the agreed height reaches a multiple of `block_interval`
//!   (or the last attempt fell more than one interval behind)
//! - **Cleanup**: retention pass on an hourly interval or a 6-field cron
//!   expression (sec min hour day month dow)
//!
//! ```toml
//! [snapshots.cleanup]
//! enabled = true
//! keep_count = 3
//! schedule = "0 0 3 * * *"  # Daily at 3 AM
//! ```

pub mod cleanup;
pub mod polling;

pub use cleanup::{CleanupHandle, CleanupScheduler};
pub use polling::{blocks_left, PollingScheduler, PollingSettings, TickOutcome};
