pub mod agreement;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod fleet_status;
pub mod remote;
pub mod retention;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod web;

// Re-export commonly used types
pub use agreement::AgreementChecker;
pub use config::{Config, ConfigManager, TargetConfig};
pub use database::Database;
pub use errors::{Result, SnapshotError};
pub use fleet_status::{FleetStatus, Phase};
pub use remote::{CommandRunner, NodeHost, RemoteHost};
pub use retention::RetentionManager;
pub use scheduler::{CleanupScheduler, PollingScheduler};
pub use snapshot::SnapshotLifecycle;
pub use storage::{ObjectStore, S3ObjectStore};
