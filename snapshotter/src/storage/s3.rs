//! S3-compatible object store.
//!
//! Endpoint, region and bucket come from config with environment fallbacks
//! (`S3_ENDPOINT_URL`, `AWS_DEFAULT_REGION`, `S3_BUCKET_NAME`). Static
//! credentials are read from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::{delete_batches, directory_prefix, normalize_root_prefix, ObjectStore};
use crate::config::S3Config;
use crate::constants::{defaults, limits};
use crate::errors::{Result, SnapshotError};

/// Connection settings after applying environment fallbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket_name: String,
    pub root_prefix: String,
    pub access_key: String,
    pub secret_key: String,
}

impl S3Settings {
    pub fn resolve<F>(config: &S3Config, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: &str| Some(value.to_string()).filter(|v| !v.is_empty());
        let from_env = |key: &str| env(key).filter(|v| !v.is_empty());

        let endpoint = non_empty(&config.endpoint)
            .or_else(|| from_env("S3_ENDPOINT_URL"))
            .ok_or_else(|| {
                SnapshotError::Storage(
                    "S3 endpoint not set in config or S3_ENDPOINT_URL".to_string(),
                )
            })?;

        let region = non_empty(&config.region)
            .or_else(|| from_env("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| defaults::S3_REGION.to_string());

        let bucket_name = non_empty(&config.bucket_name)
            .or_else(|| from_env("S3_BUCKET_NAME"))
            .unwrap_or_default();

        let access_key = from_env("AWS_ACCESS_KEY_ID").ok_or_else(|| {
            SnapshotError::Storage(
                "access key not set in AWS_ACCESS_KEY_ID environment variable".to_string(),
            )
        })?;
        let secret_key = from_env("AWS_SECRET_ACCESS_KEY").ok_or_else(|| {
            SnapshotError::Storage(
                "secret key not set in AWS_SECRET_ACCESS_KEY environment variable".to_string(),
            )
        })?;

        Ok(Self {
            endpoint,
            region,
            bucket_name,
            root_prefix: normalize_root_prefix(&config.root_prefix),
            access_key,
            secret_key,
        })
    }
}

pub struct S3ObjectStore {
    client: Client,
    endpoint: String,
    region: String,
    bucket_name: String,
    root_prefix: String,
}

impl S3ObjectStore {
    pub async fn from_config(config: &S3Config) -> Result<Self> {
        let settings = S3Settings::resolve(config, |key| std::env::var(key).ok())?;
        Ok(Self::connect(settings).await)
    }

    pub async fn connect(settings: S3Settings) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;

        let credentials = Credentials::new(
            settings.access_key,
            settings.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&settings.endpoint)
            .force_path_style(true)
            .credentials_provider(credentials)
            .build();

        info!(
            "Initialized S3 client (endpoint {}, region {}, bucket {})",
            settings.endpoint, settings.region, settings.bucket_name
        );

        Self {
            client: Client::from_conf(s3_config),
            endpoint: settings.endpoint,
            region: settings.region,
            bucket_name: settings.bucket_name,
            root_prefix: settings.root_prefix,
        }
    }

    fn require_bucket(&self) -> Result<&str> {
        if self.bucket_name.is_empty() {
            return Err(SnapshotError::Storage(
                "bucket name not specified and no default bucket configured".to_string(),
            ));
        }
        Ok(&self.bucket_name)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SnapshotError::Storage(format!("failed to list S3 objects: {}", e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<()> {
        let bucket = self.require_bucket()?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| {
                SnapshotError::Storage(format!(
                    "failed to upload S3 object {}/{}: {}",
                    bucket, key, e
                ))
            })?;

        debug!("Uploaded S3 object {}/{}", bucket, key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let bucket = self.require_bucket()?;
        let prefix = directory_prefix(prefix);

        let keys = self.list_keys(bucket, &prefix).await?;
        if keys.is_empty() {
            info!("No objects found to delete under {}/{}", bucket, prefix);
            return Ok(0);
        }

        info!("Deleting {} objects under {}/{}", keys.len(), bucket, prefix);

        for batch in delete_batches(&keys, limits::DELETE_BATCH_SIZE) {
            let mut objects = Vec::with_capacity(batch.len());
            for key in batch {
                objects.push(
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| SnapshotError::Storage(e.to_string()))?,
                );
            }

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| SnapshotError::Storage(e.to_string()))?;

            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    SnapshotError::Storage(format!("failed to delete batch of S3 objects: {}", e))
                })?;
        }

        info!("Deleted {} objects under {}/{}", keys.len(), bucket, prefix);
        Ok(keys.len())
    }

    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn root_prefix(&self) -> &str {
        &self.root_prefix
    }
}
