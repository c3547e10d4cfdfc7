// File: snapshotter/src/config/mod.rs
pub mod manager;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
pub use manager::ConfigManager;

use crate::constants::{defaults, timing};
use crate::errors::{Result, SnapshotError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain identifier every target must report (hex or decimal)
    pub chain_id: String,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub snapshots: SnapshotsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    // Populated from the per-target config files
    #[serde(skip)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub private_key_path: String,
    #[serde(default)]
    pub private_key_passphrase_path: String,
    #[serde(default)]
    pub known_hosts_path: String,
    #[serde(default)]
    pub ignore_host_key: bool,
    pub connect_timeout_seconds: Option<u64>,
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(timing::SSH_CONNECT_TIMEOUT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotsConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default)]
    pub block_interval: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub run_once: bool,
    pub settle_delay_seconds: Option<u64>,
    pub dry_run_delay_seconds: Option<u64>,
    pub cooldown_seconds: Option<u64>,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub rclone: RcloneConfig,
    #[serde(default)]
    pub s3: S3Config,
}

fn default_check_interval() -> u64 {
    12 // one slot
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            block_interval: 0,
            dry_run: false,
            run_once: false,
            settle_delay_seconds: None,
            dry_run_delay_seconds: None,
            cooldown_seconds: None,
            cleanup: CleanupConfig::default(),
            rclone: RcloneConfig::default(),
            s3: S3Config::default(),
        }
    }
}

impl SnapshotsConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay_seconds
            .map(Duration::from_secs)
            .unwrap_or(timing::SETTLE_DELAY)
    }

    pub fn dry_run_delay(&self) -> Duration {
        self.dry_run_delay_seconds
            .map(Duration::from_secs)
            .unwrap_or(timing::DRY_RUN_DELAY)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown_seconds
            .map(Duration::from_secs)
            .unwrap_or(timing::POST_ATTEMPT_COOLDOWN)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keep_count: i64,
    #[serde(default)]
    pub check_interval_hours: i64,
    /// Optional 6-field cron expression; replaces the hourly interval when set
    pub schedule: Option<String>,
}

impl CleanupConfig {
    /// Number of unprotected attempts to keep, falling back to the default for non-positive values
    pub fn effective_keep_count(&self) -> usize {
        if self.keep_count <= 0 {
            defaults::KEEP_COUNT
        } else {
            self.keep_count as usize
        }
    }

    pub fn effective_interval(&self) -> Duration {
        let hours = if self.check_interval_hours <= 0 {
            defaults::CLEANUP_INTERVAL_HOURS
        } else {
            self.check_interval_hours as u64
        };
        Duration::from_secs(hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RcloneConfig {
    #[serde(default = "default_rclone_version")]
    pub version: String,
    #[serde(default = "default_rclone_entrypoint")]
    pub entrypoint: String,
    #[serde(default = "default_command_template")]
    pub command_template: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_rclone_version() -> String {
    defaults::RCLONE_VERSION.to_string()
}

fn default_rclone_entrypoint() -> String {
    defaults::RCLONE_ENTRYPOINT.to_string()
}

fn default_command_template() -> String {
    DEFAULT_COMMAND_TEMPLATE.to_string()
}

impl Default for RcloneConfig {
    fn default() -> Self {
        Self {
            version: default_rclone_version(),
            entrypoint: default_rclone_entrypoint(),
            command_template: default_command_template(),
            env: BTreeMap::new(),
        }
    }
}

/// Default arguments passed to the rclone container entrypoint.
///
/// Placeholders: `{data_dir}`, `{bucket_name}`, `{upload_prefix}`, `{block_number}`.
pub const DEFAULT_COMMAND_TEMPLATE: &str = r#"-ac "
apk add --no-cache tar zstd jq &&
cd {data_dir} &&
cat {data_dir}/_snapshot_metadata.json | jq . &&
tar -I zstd \
--exclude=./nodekey \
--exclude=./key \
--exclude=./discovery-secret \
-cvf - . \
| rclone rcat --s3-chunk-size 150M mys3:/{bucket_name}/{upload_prefix}/{block_number}/snapshot.tar.zst &&
rclone copy {data_dir}/_snapshot_eth_getBlockByNumber.json mys3:/{bucket_name}/{upload_prefix}/{block_number} &&
rclone copy {data_dir}/_snapshot_web3_clientVersion.json mys3:/{bucket_name}/{upload_prefix}/{block_number} &&
rclone copy {data_dir}/_snapshot_metadata.json mys3:/{bucket_name}/{upload_prefix}/{block_number} &&
echo {block_number} | rclone rcat mys3:/{bucket_name}/{upload_prefix}/latest
""#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub root_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub api_token: String,
}

fn default_listen_addr() -> String {
    defaults::LISTEN_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Defaults to the config file stem
    #[serde(default)]
    pub alias: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub data_dir: String,
    pub upload_prefix: String,
    /// Static labels written into the metadata sidecar
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: ContainerNames,
    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_ssh_port() -> u16 {
    defaults::SSH_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerNames {
    /// Always-on auxiliary service paused while data is transferred
    #[serde(default = "default_sidecar")]
    pub sidecar: String,
    #[serde(default = "default_execution")]
    pub execution: String,
    #[serde(default = "default_consensus")]
    pub consensus: String,
}

fn default_sidecar() -> String {
    defaults::SIDECAR_CONTAINER.to_string()
}

fn default_execution() -> String {
    defaults::EXECUTION_CONTAINER.to_string()
}

fn default_consensus() -> String {
    defaults::CONSENSUS_CONTAINER.to_string()
}

impl Default for ContainerNames {
    fn default() -> Self {
        Self {
            sidecar: default_sidecar(),
            execution: default_execution(),
            consensus: default_consensus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_beacon_endpoint")]
    pub beacon: String,
    #[serde(default = "default_execution_endpoint")]
    pub execution: String,
}

fn default_beacon_endpoint() -> String {
    defaults::BEACON_ENDPOINT.to_string()
}

fn default_execution_endpoint() -> String {
    defaults::EXECUTION_ENDPOINT.to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            beacon: default_beacon_endpoint(),
            execution: default_execution_endpoint(),
        }
    }
}

fn invalid(message: impl Into<String>) -> SnapshotError {
    SnapshotError::Config(message.into())
}

impl Config {
    /// Startup validation; any error here aborts the process
    pub fn validate(&self) -> Result<()> {
        if self.chain_id.trim().is_empty() {
            return Err(invalid("chain_id must be set"));
        }
        if self.snapshots.block_interval == 0 {
            return Err(invalid("snapshots.block_interval must be greater than 0"));
        }
        if self.snapshots.check_interval_seconds == 0 {
            return Err(invalid(
                "snapshots.check_interval_seconds must be greater than 0"
            ));
        }
        if self.server.api_token.trim().is_empty() {
            return Err(invalid(
                "server.api_token must be set - API authentication is required"
            ));
        }
        if self.targets.is_empty() {
            return Err(invalid("no targets configured"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.alias.as_str()) {
                return Err(invalid(format!("duplicate target alias '{}'", target.alias)));
            }
            for (field, value) in [
                ("host", &target.host),
                ("user", &target.user),
                ("data_dir", &target.data_dir),
                ("upload_prefix", &target.upload_prefix),
            ] {
                if value.trim().is_empty() {
                    return Err(invalid(format!(
                        "target '{}' is missing required field '{}'",
                        target.alias,
                        field
                    )));
                }
            }
        }

        Ok(())
    }
}
