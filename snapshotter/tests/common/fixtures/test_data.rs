//! Common test data and constants

use snapshotter::config::{ContainerNames, Endpoints, TargetConfig};
use std::collections::BTreeMap;

/// Common target aliases
pub mod targets {
    pub const GETH: &str = "geth-1";
    pub const RETH: &str = "reth-1";
    pub const NETHERMIND: &str = "nethermind-1";
}

/// Chain identifiers
pub mod chains {
    pub const MAINNET_HEX: &str = "0x1";
    pub const MAINNET_DEC: &str = "1";
    pub const HOLESKY_HEX: &str = "0x4268";
}

/// Common block heights
pub mod heights {
    pub const INTERVAL: u64 = 1000;
    pub const ON_BOUNDARY: u64 = 5000;
    pub const MID_INTERVAL: u64 = 5400;
}

pub const API_TOKEN: &str = "test-api-token";

/// Target definition with default container names and endpoints
pub fn target_config(alias: &str) -> TargetConfig {
    TargetConfig {
        alias: alias.to_string(),
        host: "127.0.0.1".to_string(),
        user: "snapshots".to_string(),
        port: 22,
        data_dir: format!("/data/{}", alias),
        upload_prefix: format!("mainnet/{}", alias),
        metadata: BTreeMap::new(),
        containers: ContainerNames::default(),
        endpoints: Endpoints::default(),
    }
}
