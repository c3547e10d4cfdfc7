// File: snapshotter/src/config/manager.rs
use super::{Config, TargetConfig};
use anyhow::{anyhow, Result};
use glob::glob;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        // Every other toml file in the directory describes one target
        let pattern = format!("{}/*.toml", config_dir);
        let mut targets = Vec::new();

        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow!("Invalid filename"))?;

            if filename == "main.toml" {
                continue;
            }

            let file_alias = filename
                .strip_suffix(".toml")
                .ok_or_else(|| anyhow!("Invalid config filename: {}", filename))?;

            debug!("Loading target config: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let mut target: TargetConfig = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            if target.alias.trim().is_empty() {
                target.alias = file_alias.to_string();
            }

            info!(
                "Target {} -> {}@{}:{}",
                target.alias, target.user, target.host, target.port
            );
            targets.push(target);
        }

        targets.sort_by(|a, b| a.alias.cmp(&b.alias));
        config.targets = targets;

        expand_environment(&mut config);
        apply_rclone_defaults(&mut config);
        config.validate()?;

        info!(
            "Loaded {} targets (block interval {}, dry run {}, run once {})",
            config.targets.len(),
            config.snapshots.block_interval,
            config.snapshots.dry_run,
            config.snapshots.run_once
        );

        Ok(config)
    }
}

/// Expand `$VAR` / `${VAR}` references; unknown variables are left untouched
pub fn expand_env(value: &str) -> String {
    shellexpand::env_with_context_no_errors(value, |var| std::env::var(var).ok()).into_owned()
}

fn expand_environment(config: &mut Config) {
    let ssh = &mut config.ssh;
    ssh.private_key_path = expand_env(&ssh.private_key_path);
    ssh.private_key_passphrase_path = expand_env(&ssh.private_key_passphrase_path);
    ssh.known_hosts_path = expand_env(&ssh.known_hosts_path);

    let s3 = &mut config.snapshots.s3;
    s3.endpoint = expand_env(&s3.endpoint);
    s3.bucket_name = expand_env(&s3.bucket_name);
    s3.region = expand_env(&s3.region);
    s3.root_prefix = expand_env(&s3.root_prefix);

    for value in config.snapshots.rclone.env.values_mut() {
        *value = expand_env(value);
    }

    config.database.path = expand_env(&config.database.path);
    config.server.api_token = expand_env(&config.server.api_token);

    for target in &mut config.targets {
        target.data_dir = expand_env(&target.data_dir);
    }
}

/// Point rclone at the same bucket the retention cleanup works on unless overridden
fn apply_rclone_defaults(config: &mut Config) {
    let s3 = &config.snapshots.s3;
    if s3.endpoint.is_empty() {
        return;
    }

    let mut derived = vec![("RCLONE_CONFIG_MYS3_ENDPOINT", s3.endpoint.clone())];
    if !s3.bucket_name.is_empty() {
        derived.push(("RCLONE_CONFIG_MYS3_BUCKET_NAME", s3.bucket_name.clone()));
    }
    if !s3.region.is_empty() {
        derived.push(("RCLONE_CONFIG_MYS3_REGION", s3.region.clone()));
    }

    let env = &mut config.snapshots.rclone.env;
    for (key, value) in derived {
        env.entry(key.to_string()).or_insert(value);
    }
}
