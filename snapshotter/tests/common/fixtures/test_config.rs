//! Test configuration builder for creating test configs programmatically

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder writing `main.toml` plus one file per target into a temp directory
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_config: MainConfigBuilder,
    target_configs: BTreeMap<String, TargetConfigBuilder>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_config: MainConfigBuilder::default(),
            target_configs: BTreeMap::new(),
        }
    }

    /// Configure main settings
    pub fn with_main_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(MainConfigBuilder) -> MainConfigBuilder,
    {
        self.main_config = f(self.main_config);
        self
    }

    /// Add a target, stored as `<file_stem>.toml`
    pub fn with_target<F>(mut self, file_stem: &str, f: F) -> Self
    where
        F: FnOnce(TargetConfigBuilder) -> TargetConfigBuilder,
    {
        let builder = f(TargetConfigBuilder::new(file_stem));
        self.target_configs.insert(file_stem.to_string(), builder);
        self
    }

    /// Build and write config files to temp directory
    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), self.main_config.to_toml())
            .expect("Failed to write main.toml");

        for (stem, builder) in self.target_configs {
            fs::write(config_dir.join(format!("{}.toml", stem)), builder.to_toml())
                .expect("Failed to write target config");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main configuration builder
#[derive(Clone)]
pub struct MainConfigBuilder {
    chain_id: String,
    block_interval: u64,
    api_token: String,
    dry_run: bool,
    cleanup_schedule: Option<String>,
    s3_endpoint: String,
    s3_bucket: String,
    extra: String,
}

impl MainConfigBuilder {
    pub fn chain_id(mut self, chain_id: &str) -> Self {
        self.chain_id = chain_id.to_string();
        self
    }

    pub fn block_interval(mut self, interval: u64) -> Self {
        self.block_interval = interval;
        self
    }

    pub fn api_token(mut self, token: &str) -> Self {
        self.api_token = token.to_string();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cleanup_schedule(mut self, schedule: &str) -> Self {
        self.cleanup_schedule = Some(schedule.to_string());
        self
    }

    pub fn s3(mut self, endpoint: &str, bucket: &str) -> Self {
        self.s3_endpoint = endpoint.to_string();
        self.s3_bucket = bucket.to_string();
        self
    }

    /// Raw TOML appended after the generated sections
    pub fn extra(mut self, toml: &str) -> Self {
        self.extra = toml.to_string();
        self
    }

    fn to_toml(&self) -> String {
        let schedule = self
            .cleanup_schedule
            .as_ref()
            .map(|s| format!("schedule = \"{}\"\n", s))
            .unwrap_or_default();
        format!(
            r#"
chain_id = "{}"

[ssh]
private_key_path = "$HOME/.ssh/id_ed25519"

[snapshots]
block_interval = {}
dry_run = {}

[snapshots.cleanup]
enabled = true
keep_count = 2
{}
[snapshots.s3]
endpoint = "{}"
bucket_name = "{}"

[server]
api_token = "{}"
{}
"#,
            self.chain_id,
            self.block_interval,
            self.dry_run,
            schedule,
            self.s3_endpoint,
            self.s3_bucket,
            self.api_token,
            self.extra
        )
    }
}

impl Default for MainConfigBuilder {
    fn default() -> Self {
        Self {
            chain_id: "0x1".to_string(),
            block_interval: 1000,
            api_token: "test-api-token".to_string(),
            dry_run: false,
            cleanup_schedule: None,
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_bucket: "snapshots".to_string(),
            extra: String::new(),
        }
    }
}

/// Target configuration builder
pub struct TargetConfigBuilder {
    alias: Option<String>,
    host: String,
    user: String,
    data_dir: String,
    upload_prefix: String,
    labels: BTreeMap<String, String>,
}

impl TargetConfigBuilder {
    pub fn new(file_stem: &str) -> Self {
        Self {
            alias: None,
            host: "10.0.0.1".to_string(),
            user: "snapshots".to_string(),
            data_dir: format!("/data/{}", file_stem),
            upload_prefix: format!("mainnet/{}", file_stem),
            labels: BTreeMap::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn data_dir(mut self, data_dir: &str) -> Self {
        self.data_dir = data_dir.to_string();
        self
    }

    pub fn upload_prefix(mut self, prefix: &str) -> Self {
        self.upload_prefix = prefix.to_string();
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    fn to_toml(&self) -> String {
        let mut toml = String::new();
        if let Some(alias) = &self.alias {
            toml.push_str(&format!("alias = \"{}\"\n", alias));
        }
        toml.push_str(&format!(
            "host = \"{}\"\nuser = \"{}\"\ndata_dir = \"{}\"\nupload_prefix = \"{}\"\n",
            self.host, self.user, self.data_dir, self.upload_prefix
        ));
        if !self.labels.is_empty() {
            toml.push_str("\n[metadata]\n");
            for (key, value) in &self.labels {
                toml.push_str(&format!("{} = \"{}\"\n", key, value));
            }
        }
        toml
    }
}

/// Test configuration with temporary directory
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn config_dir_str(&self) -> String {
        self.config_dir.to_string_lossy().into_owned()
    }
}
