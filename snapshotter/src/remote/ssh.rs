// File: snapshotter/src/remote/ssh.rs

use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::CommandRunner;
use crate::config::SshConfig;
use crate::errors::{Result, SnapshotError};

/// Key material and host-key policy shared by every target
#[derive(Clone)]
pub struct SshCredentials {
    private_key: String,
    passphrase: Option<String>,
    known_hosts_path: Option<String>,
    connect_timeout: Duration,
}

impl SshCredentials {
    pub async fn load(config: &SshConfig) -> anyhow::Result<Self> {
        if config.private_key_path.ends_with(".pub") {
            return Err(anyhow::anyhow!(
                "SSH key path should point to private key, not public key: {}",
                config.private_key_path
            ));
        }

        let private_key = tokio::fs::read_to_string(&config.private_key_path)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read SSH key from {}: {}",
                    config.private_key_path,
                    e
                )
            })?;

        let passphrase = if config.private_key_passphrase_path.is_empty() {
            None
        } else {
            let content = tokio::fs::read_to_string(&config.private_key_passphrase_path)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to read SSH key passphrase from {}: {}",
                        config.private_key_passphrase_path,
                        e
                    )
                })?;
            Some(content.trim_end_matches(['\r', '\n']).to_string())
        };

        let known_hosts_path = if config.ignore_host_key {
            warn!("SECURITY WARNING: SSH host key verification is disabled (ssh.ignore_host_key = true)");
            None
        } else {
            Some(config.known_hosts_path.clone())
        };

        Ok(Self {
            private_key,
            passphrase,
            known_hosts_path,
            connect_timeout: config.connect_timeout(),
        })
    }

    fn server_check(&self) -> ServerCheckMethod {
        match &self.known_hosts_path {
            Some(path) => ServerCheckMethod::KnownHostsFile(path.clone()),
            None => ServerCheckMethod::NoCheck,
        }
    }
}

/// One authenticated SSH session per target.
///
/// The client is cached; a transport error drops it so the next command reconnects.
pub struct SshSession {
    alias: String,
    host: String,
    port: u16,
    user: String,
    credentials: SshCredentials,
    client: Mutex<Option<Arc<Client>>>,
}

impl SshSession {
    /// Connect eagerly; an unreachable host fails construction
    pub async fn connect(
        alias: &str,
        host: &str,
        port: u16,
        user: &str,
        credentials: SshCredentials,
    ) -> Result<Self> {
        let session = Self {
            alias: alias.to_string(),
            host: host.to_string(),
            port,
            user: user.to_string(),
            credentials,
            client: Mutex::new(None),
        };
        session.client().await?;
        Ok(session)
    }

    async fn open(&self) -> Result<Client> {
        debug!(
            "Establishing SSH connection to {}@{}:{} ({})",
            self.user, self.host, self.port, self.alias
        );

        let auth = AuthMethod::with_key(
            &self.credentials.private_key,
            self.credentials.passphrase.as_deref(),
        );
        let timeout = self.credentials.connect_timeout;

        let client = tokio::time::timeout(
            timeout,
            Client::connect(
                (self.host.as_str(), self.port),
                &self.user,
                auth,
                self.credentials.server_check(),
            ),
        )
        .await
        .map_err(|_| {
            SnapshotError::unreachable(
                &self.alias,
                format!("SSH connection timed out after {}s", timeout.as_secs()),
            )
        })?
        .map_err(|e| {
            SnapshotError::unreachable(
                &self.alias,
                format!("failed to connect to {}@{}: {}", self.user, self.host, e),
            )
        })?;

        debug!("SSH connection established to {}", self.alias);
        Ok(client)
    }

    async fn client(&self) -> Result<Arc<Client>> {
        if let Some(client) = self.cached() {
            return Ok(client);
        }

        let client = Arc::new(self.open().await?);
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = Some(client.clone());
        Ok(client)
    }

    fn cached(&self) -> Option<Arc<Client>> {
        self.client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn invalidate(&self) {
        *self.client.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl CommandRunner for SshSession {
    async fn run(&self, command: &str) -> Result<String> {
        let client = self.client().await?;
        debug!("Executing command on {}: {}", self.alias, command);

        let result = match client.execute(command).await {
            Ok(result) => result,
            Err(e) => {
                self.invalidate();
                return Err(SnapshotError::unreachable(
                    &self.alias,
                    format!("SSH command execution failed: {}", e),
                ));
            }
        };

        let stdout = result.stdout.trim().to_string();
        let stderr = result.stderr.trim();

        debug!(
            "Command completed on {} with exit code {}, stdout: {} chars, stderr: {} chars",
            self.alias,
            result.exit_status,
            stdout.len(),
            stderr.len()
        );

        if result.exit_status != 0 {
            let output = [stdout.as_str(), stderr]
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(SnapshotError::remote_command(
                &self.alias,
                format!(
                    "exit code {}: {}",
                    result.exit_status,
                    if output.is_empty() { "Unknown error" } else { &output }
                ),
            ));
        }

        Ok(stdout)
    }
}
