//! HTTP request handlers for the snapshot API.
//!
//! This module is organized by domain:
//! - `common` - Response envelope, query structs, and utilities
//! - `runs` - Snapshot attempts and their persisted flag
//! - `targets` - Per-target results and their persisted flag
//! - `status` - Live fleet status

pub mod common;
pub mod runs;
pub mod status;
pub mod targets;

pub use runs::*;
pub use status::*;
pub use targets::*;
