// File: snapshotter/src/snapshot/mod.rs

//! Fleet-wide snapshot lifecycle
//!
//! One attempt walks every target through the same phases in lock-step:
//!
//! # Snapshot Process
//!
//! 1. **Preparing**: force-stop the sidecar, wait for writes to settle, re-verify
//!    that all execution clients agree on the height, dump `eth_getBlockByNumber`
//!    and `web3_clientVersion` next to the data, stop the execution client
//! 2. **Uploading**: ship each data directory to `{upload_prefix}/{height}`;
//!    every target is awaited even when some fail
//! 3. Write the `latest` marker once every target uploaded
//! 4. **Restoring**: start the sidecar and the execution client, restart the
//!    consensus client
//!
//! Preparing and Restoring fail fast: the first target error aborts the phase.
//! Dry-run mode skips both and simulates uploads after a fixed delay.

pub mod lifecycle;

pub use lifecycle::{LifecycleSettings, SnapshotLifecycle};
