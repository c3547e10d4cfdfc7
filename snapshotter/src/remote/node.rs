// File: snapshotter/src/remote/node.rs
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{parse_hex_quantity, shell_quote, CommandRunner, RemoteHost, SyncStatus};
use crate::config::{RcloneConfig, TargetConfig};
use crate::constants::{files, rpc};
use crate::errors::{Result, SnapshotError};

/// A beacon + execution node pair driven through shell commands.
///
/// Containers are managed with `docker`, endpoints are queried with `curl`/`jq`
/// and uploads run inside a throwaway `rclone/rclone` container.
pub struct NodeHost {
    target: TargetConfig,
    rclone: RcloneConfig,
    bucket_name: String,
    runner: Arc<dyn CommandRunner>,
}

impl NodeHost {
    pub fn new(
        target: TargetConfig,
        rclone: RcloneConfig,
        bucket_name: String,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            target,
            rclone,
            bucket_name,
            runner,
        }
    }

    fn rpc_command(&self, payload: &str) -> String {
        format!(
            r#"curl -s -X POST -H "Content-Type: application/json" --data {} {} | jq -r ".result""#,
            shell_quote(payload),
            self.target.endpoints.execution
        )
    }

    fn render_template(&self, source_dir: &str, destination_prefix: &str, block_height: u64) -> String {
        self.rclone
            .command_template
            .replace("{data_dir}", source_dir)
            .replace("{bucket_name}", &self.bucket_name)
            .replace("{upload_prefix}", destination_prefix)
            .replace("{block_number}", &block_height.to_string())
    }

    fn upload_command(&self, source_dir: &str, destination_prefix: &str, block_height: u64) -> String {
        let mut cmd = format!("docker run --rm -v {}:{}", source_dir, source_dir);
        for (key, value) in &self.rclone.env {
            cmd.push_str(&format!(" -e {}={}", key, shell_quote(value)));
        }
        cmd.push_str(&format!(
            " --entrypoint {} rclone/rclone:{} {}",
            self.rclone.entrypoint,
            self.rclone.version,
            self.render_template(source_dir, destination_prefix, block_height)
        ));
        cmd
    }

    async fn write_metadata(&self, source_dir: &str, block_height: u64) -> Result<()> {
        let alias = &self.target.alias;
        let image = self
            .runner
            .run(&format!(
                "docker inspect --format '{{{{.Config.Image}}}}' \"{}\"",
                self.target.containers.execution
            ))
            .await?;

        let metadata = json!({
            "alias": alias,
            "blockNumber": block_height,
            "image": image.trim(),
            "labels": self.target.metadata,
        });

        let path = format!("{}/{}", source_dir, files::METADATA);
        self.runner
            .run(&format!(
                "echo {} | sudo tee {} > /dev/null",
                shell_quote(&metadata.to_string()),
                path
            ))
            .await?;

        debug!("Wrote snapshot metadata on {} to {}", alias, path);
        Ok(())
    }
}

#[async_trait]
impl RemoteHost for NodeHost {
    fn target(&self) -> &TargetConfig {
        &self.target
    }

    async fn chain_id(&self) -> Result<String> {
        let out = self.runner.run(&self.rpc_command(rpc::CHAIN_ID)).await?;
        let chain_id = out.trim().to_string();
        if chain_id.is_empty() || chain_id == "null" {
            return Err(SnapshotError::remote_command(
                &self.target.alias,
                "eth_chainId returned no result",
            ));
        }
        Ok(chain_id)
    }

    async fn sync_status(&self) -> Result<SyncStatus> {
        let out = self
            .runner
            .run(&format!(
                "curl -s {}/eth/v1/node/syncing | jq -r .data",
                self.target.endpoints.beacon
            ))
            .await?;

        serde_json::from_str(out.trim()).map_err(|e| {
            SnapshotError::remote_command(
                &self.target.alias,
                format!("failed parsing CL sync status '{}': {}", out.trim(), e),
            )
        })
    }

    async fn execution_syncing(&self) -> Result<bool> {
        let out = self.runner.run(&self.rpc_command(rpc::SYNCING)).await?;
        let out = out.trim();

        match out {
            "false" => Ok(false),
            "true" => Ok(true),
            _ => match serde_json::from_str::<serde_json::Value>(out) {
                Ok(serde_json::Value::Object(progress)) => {
                    warn!(
                        "EL on {} is syncing (current {:?}, highest {:?})",
                        self.target.alias,
                        progress.get("currentBlock"),
                        progress.get("highestBlock")
                    );
                    Ok(true)
                }
                _ => Err(SnapshotError::remote_command(
                    &self.target.alias,
                    format!("failed parsing EL sync status output '{}'", out),
                )),
            },
        }
    }

    async fn execution_block_height(&self) -> Result<u64> {
        let out = self.runner.run(&self.rpc_command(rpc::BLOCK_NUMBER)).await?;
        let height = parse_hex_quantity(&out).ok_or_else(|| {
            SnapshotError::remote_command(
                &self.target.alias,
                format!("invalid eth_blockNumber result '{}'", out.trim()),
            )
        })?;
        debug!("EL block on {}: {}", self.target.alias, height);
        Ok(height)
    }

    async fn stop_service(&self, name: &str, force: bool) -> Result<()> {
        debug!("Stopping container {} on {} (force: {})", name, self.target.alias, force);
        let args = if force { "-t 0 " } else { "" };
        self.runner
            .run(&format!("docker stop {}\"{}\"", args, name))
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to stop container {} on {}: {}", name, self.target.alias, e);
                e
            })
    }

    async fn start_service(&self, name: &str) -> Result<()> {
        debug!("Starting container {} on {}", name, self.target.alias);
        self.runner
            .run(&format!("docker start \"{}\"", name))
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to start container {} on {}: {}", name, self.target.alias, e);
                e
            })
    }

    async fn dump_rpc_response_to_file(&self, payload: &str, path: &str) -> Result<()> {
        let cmd = format!("{} | sudo tee {} > /dev/null", self.rpc_command(payload), path);
        self.runner.run(&cmd).await?;
        debug!("Dumped RPC response on {} to {}", self.target.alias, path);
        Ok(())
    }

    async fn sync_and_upload_directory(
        &self,
        source_dir: &str,
        destination_prefix: &str,
        block_height: u64,
    ) -> Result<()> {
        self.write_metadata(source_dir, block_height).await?;

        let cmd = self.upload_command(source_dir, destination_prefix, block_height);
        self.runner.run(&cmd).await.map_err(|e| {
            warn!("rclone upload failed on {}: {}", self.target.alias, e);
            e
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerNames, Endpoints};
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    /// Replays canned outputs and records every command
    #[derive(Default)]
    struct ScriptedRunner {
        outputs: Mutex<VecDeque<Result<String>>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn with(outputs: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.into()),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn host(runner: Arc<ScriptedRunner>) -> NodeHost {
        let mut metadata = BTreeMap::new();
        metadata.insert("client".to_string(), "geth".to_string());
        let target = TargetConfig {
            alias: "geth-1".to_string(),
            host: "10.0.0.1".to_string(),
            user: "snap".to_string(),
            port: 22,
            data_dir: "/data/geth".to_string(),
            upload_prefix: "mainnet/geth".to_string(),
            metadata,
            containers: ContainerNames::default(),
            endpoints: Endpoints::default(),
        };
        let mut rclone = RcloneConfig::default();
        rclone.env.insert("RCLONE_CONFIG_MYS3_TYPE".to_string(), "s3".to_string());
        NodeHost::new(target, rclone, "snapshots".to_string(), runner)
    }

    #[tokio::test]
    async fn test_block_height_decoded_from_hex() {
        let runner = ScriptedRunner::with(vec![Ok("0x3e8\n".to_string())]);
        let node = host(runner.clone());
        assert_eq!(node.execution_block_height().await.unwrap(), 1000);
        assert!(runner.commands()[0].contains("eth_blockNumber"));
        assert!(runner.commands()[0].contains("http://localhost:8545"));
    }

    #[tokio::test]
    async fn test_garbage_block_height_is_remote_command_error() {
        let runner = ScriptedRunner::with(vec![Ok("null".to_string())]);
        let node = host(runner);
        let err = node.execution_block_height().await.unwrap_err();
        assert!(matches!(err, SnapshotError::RemoteCommand { .. }));
    }

    #[tokio::test]
    async fn test_execution_syncing_variants() {
        let runner = ScriptedRunner::with(vec![
            Ok("false\n".to_string()),
            Ok(r#"{"startingBlock":"0x0","currentBlock":"0x10","highestBlock":"0x20"}"#.to_string()),
            Ok("<html>".to_string()),
        ]);
        let node = host(runner);
        assert!(!node.execution_syncing().await.unwrap());
        assert!(node.execution_syncing().await.unwrap());
        assert!(node.execution_syncing().await.is_err());
    }

    #[tokio::test]
    async fn test_sync_status_parsed() {
        let runner = ScriptedRunner::with(vec![Ok(
            r#"{"head_slot":"100","sync_distance":"1","is_syncing":false,"is_optimistic":false,"el_offline":false}"#
                .to_string(),
        )]);
        let node = host(runner.clone());
        let status = node.sync_status().await.unwrap();
        assert_eq!(status.head_slot, 100);
        assert_eq!(status.sync_distance, 1);
        assert_eq!(
            runner.commands()[0],
            "curl -s http://localhost:5052/eth/v1/node/syncing | jq -r .data"
        );
    }

    #[tokio::test]
    async fn test_stop_and_start_commands() {
        let runner = ScriptedRunner::with(vec![]);
        let node = host(runner.clone());
        node.stop_service("snooper-engine", true).await.unwrap();
        node.stop_service("execution", false).await.unwrap();
        node.start_service("beacon").await.unwrap();
        assert_eq!(
            runner.commands(),
            vec![
                "docker stop -t 0 \"snooper-engine\"".to_string(),
                "docker stop \"execution\"".to_string(),
                "docker start \"beacon\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_writes_metadata_then_runs_rclone() {
        let runner = ScriptedRunner::with(vec![Ok("ethereum/client-go:v1.14.0\n".to_string())]);
        let node = host(runner.clone());
        node.sync_and_upload_directory("/data/geth", "mainnet/geth", 1000)
            .await
            .unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("docker inspect"));
        assert!(commands[1].contains("ethereum/client-go:v1.14.0"));
        assert!(commands[1].contains("\"blockNumber\":1000"));
        assert!(commands[1].ends_with("/data/geth/_snapshot_metadata.json > /dev/null"));
        assert!(commands[2].starts_with("docker run --rm -v /data/geth:/data/geth -e RCLONE_CONFIG_MYS3_TYPE='s3'"));
        assert!(commands[2].contains("rclone/rclone:1.65.2"));
        assert!(commands[2].contains("mys3:/snapshots/mainnet/geth/1000/snapshot.tar.zst"));
        assert!(!commands[2].contains("{block_number}"));
    }
}
