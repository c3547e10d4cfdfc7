//! Scripted `RemoteHost` that records every call instead of talking SSH

use async_trait::async_trait;
use snapshotter::config::TargetConfig;
use snapshotter::errors::{Result, SnapshotError};
use snapshotter::remote::{RemoteHost, SyncStatus};
use std::sync::{Arc, Mutex};

use super::test_data::target_config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Stop { name: String, force: bool },
    Start { name: String },
    Dump { path: String },
    Upload {
        source_dir: String,
        destination_prefix: String,
        block_height: u64,
    },
}

struct MockState {
    height: Option<u64>,
    chain_id: String,
    cl_status: Option<SyncStatus>,
    el_syncing: bool,
    fail_upload: bool,
    fail_stop: Option<String>,
    calls: Vec<HostCall>,
}

pub struct MockRemoteHost {
    target: TargetConfig,
    state: Mutex<MockState>,
}

impl MockRemoteHost {
    /// A healthy, fully synced host at `height`
    pub fn new(alias: &str, height: u64) -> Self {
        Self {
            target: target_config(alias),
            state: Mutex::new(MockState {
                height: Some(height),
                chain_id: "0x1".to_string(),
                cl_status: Some(SyncStatus::default()),
                el_syncing: false,
                fail_upload: false,
                fail_stop: None,
                calls: Vec::new(),
            }),
        }
    }

    pub fn shared(alias: &str, height: u64) -> Arc<Self> {
        Arc::new(Self::new(alias, height))
    }

    pub fn with_chain_id(self, chain_id: &str) -> Self {
        self.state().chain_id = chain_id.to_string();
        self
    }

    pub fn with_cl_status(self, status: SyncStatus) -> Self {
        self.state().cl_status = Some(status);
        self
    }

    /// Make the CL sync endpoint fail outright
    pub fn with_cl_unreachable(self) -> Self {
        self.state().cl_status = None;
        self
    }

    pub fn with_el_syncing(self, syncing: bool) -> Self {
        self.state().el_syncing = syncing;
        self
    }

    pub fn with_height_error(self) -> Self {
        self.state().height = None;
        self
    }

    pub fn with_upload_failure(self) -> Self {
        self.state().fail_upload = true;
        self
    }

    /// Fail `stop_service` for the named container
    pub fn with_stop_failure(self, name: &str) -> Self {
        self.state().fail_stop = Some(name.to_string());
        self
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = Some(height);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    pub fn uploads(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::Upload { .. }))
            .collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: HostCall) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl RemoteHost for MockRemoteHost {
    fn target(&self) -> &TargetConfig {
        &self.target
    }

    async fn chain_id(&self) -> Result<String> {
        Ok(self.state().chain_id.clone())
    }

    async fn sync_status(&self) -> Result<SyncStatus> {
        self.state()
            .cl_status
            .clone()
            .ok_or_else(|| SnapshotError::remote_command(&self.target.alias, "beacon API unavailable"))
    }

    async fn execution_syncing(&self) -> Result<bool> {
        Ok(self.state().el_syncing)
    }

    async fn execution_block_height(&self) -> Result<u64> {
        self.state()
            .height
            .ok_or_else(|| SnapshotError::unreachable(&self.target.alias, "connection reset"))
    }

    async fn stop_service(&self, name: &str, force: bool) -> Result<()> {
        self.record(HostCall::Stop {
            name: name.to_string(),
            force,
        });
        if self.state().fail_stop.as_deref() == Some(name) {
            return Err(SnapshotError::remote_command(
                &self.target.alias,
                format!("docker stop {} exited with 1", name),
            ));
        }
        Ok(())
    }

    async fn start_service(&self, name: &str) -> Result<()> {
        self.record(HostCall::Start {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn dump_rpc_response_to_file(&self, _payload: &str, path: &str) -> Result<()> {
        self.record(HostCall::Dump {
            path: path.to_string(),
        });
        Ok(())
    }

    async fn sync_and_upload_directory(
        &self,
        source_dir: &str,
        destination_prefix: &str,
        block_height: u64,
    ) -> Result<()> {
        self.record(HostCall::Upload {
            source_dir: source_dir.to_string(),
            destination_prefix: destination_prefix.to_string(),
            block_height,
        });
        if self.state().fail_upload {
            return Err(SnapshotError::remote_command(
                &self.target.alias,
                "rclone exited with 1",
            ));
        }
        Ok(())
    }
}
