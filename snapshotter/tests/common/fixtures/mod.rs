//! This module provides reusable test utilities:
//! - Scripted remote hosts and an in-memory object store
//! - Test configuration builders
//! - In-memory test databases
//! - Common test data

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_host;
pub mod mock_store;
pub mod test_config;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use mock_host::{HostCall, MockRemoteHost};
pub use mock_store::MockObjectStore;
pub use test_config::TestConfigBuilder;
pub use test_data::*;
pub use test_database::TestDatabase;
