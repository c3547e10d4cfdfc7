//! Central repository for magic numbers and fixed strings
//!
//! Anything that is configurable lives in `config`; these are the defaults
//! and the values the wire formats depend on.

use std::time::Duration;

/// Files written into each target's data directory before upload
pub mod files {
    /// Metadata sidecar describing the snapshot (image identity + labels)
    pub const METADATA: &str = "_snapshot_metadata.json";

    /// Dump of `eth_getBlockByNumber(latest)` taken while the EL is quiesced
    pub const LATEST_BLOCK: &str = "_snapshot_eth_getBlockByNumber.json";

    /// Dump of `web3_clientVersion`
    pub const CLIENT_VERSION: &str = "_snapshot_web3_clientVersion.json";

    /// Object written under the storage root prefix after a successful upload
    pub const LATEST_MARKER: &str = "latest";
}

/// JSON-RPC request bodies sent to the execution client
pub mod rpc {
    pub const LATEST_BLOCK: &str =
        r#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["latest",true],"id":1}"#;
    pub const CLIENT_VERSION: &str =
        r#"{"jsonrpc":"2.0","method":"web3_clientVersion","params":[],"id":1}"#;
    pub const SYNCING: &str = r#"{"jsonrpc":"2.0","method":"eth_syncing","params":[],"id":1}"#;
    pub const BLOCK_NUMBER: &str =
        r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;
    pub const CHAIN_ID: &str = r#"{"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":1}"#;
}

/// Lifecycle timing defaults
pub mod timing {
    use super::Duration;

    /// Wait after stopping the sidecar so in-flight writes drain
    pub const SETTLE_DELAY: Duration = Duration::from_secs(30);

    /// Simulated upload time per target in dry-run mode
    pub const DRY_RUN_DELAY: Duration = Duration::from_secs(60);

    /// Pause after a triggered attempt before ticking resumes
    pub const POST_ATTEMPT_COOLDOWN: Duration = Duration::from_secs(60);

    /// SSH connect timeout
    pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Average slot time, only used for ETA logging
    pub const SLOT_TIME: Duration = Duration::from_secs(12);
}

/// Defaults applied when the config leaves a value empty or non-positive
pub mod defaults {
    pub const DATABASE_PATH: &str = "snapshots.db";
    pub const LISTEN_ADDR: &str = "0.0.0.0:5001";
    pub const KEEP_COUNT: usize = 3;
    pub const CLEANUP_INTERVAL_HOURS: u64 = 24;
    pub const S3_REGION: &str = "us-east-1";
    pub const RCLONE_VERSION: &str = "1.65.2";
    pub const RCLONE_ENTRYPOINT: &str = "/bin/sh";
    pub const BEACON_ENDPOINT: &str = "http://localhost:5052";
    pub const EXECUTION_ENDPOINT: &str = "http://localhost:8545";
    pub const SIDECAR_CONTAINER: &str = "snooper-engine";
    pub const EXECUTION_CONTAINER: &str = "execution";
    pub const CONSENSUS_CONTAINER: &str = "beacon";
    pub const SSH_PORT: u16 = 22;
}

/// Limits
pub mod limits {
    /// Maximum page size for list endpoints
    pub const MAX_PAGE_SIZE: u32 = 20;

    /// S3 DeleteObjects accepts at most this many keys per request
    pub const DELETE_BATCH_SIZE: usize = 1000;

    /// A CL is considered in sync with this many slots of distance or fewer
    pub const MAX_SYNC_DISTANCE: u64 = 1;
}
