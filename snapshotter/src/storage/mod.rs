//! Object storage for snapshot artifacts.
//!
//! The orchestrator only ever writes the `latest` marker itself; snapshot data
//! is shipped by rclone on the targets. Retention removes whole prefixes.

pub mod s3;

pub use s3::S3ObjectStore;

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `content` under `key`, overwriting any existing object
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<()>;

    /// Delete every object under `prefix`, returning the number of keys removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;

    fn bucket_name(&self) -> &str;

    fn endpoint(&self) -> &str;

    fn region(&self) -> &str;

    /// Configured root prefix with a trailing slash, or empty
    fn root_prefix(&self) -> &str;
}

/// Normalize a root prefix so keys can be appended directly
pub fn normalize_root_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Treat a prefix as a directory so `a/1` never matches `a/10`
pub fn directory_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Split keys into request-sized batches, preserving order
pub fn delete_batches(keys: &[String], batch_size: usize) -> Vec<&[String]> {
    keys.chunks(batch_size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_prefix_normalization() {
        assert_eq!(normalize_root_prefix(""), "");
        assert_eq!(normalize_root_prefix("mainnet"), "mainnet/");
        assert_eq!(normalize_root_prefix("/mainnet/"), "mainnet/");
    }

    #[test]
    fn test_directory_prefix() {
        assert_eq!(directory_prefix("mainnet/geth/1000"), "mainnet/geth/1000/");
        assert_eq!(directory_prefix("mainnet/geth/1000/"), "mainnet/geth/1000/");
    }

    #[test]
    fn test_delete_batches_respect_limit() {
        let keys: Vec<String> = (0..2501).map(|i| format!("k{}", i)).collect();
        let batches = delete_batches(&keys, 1000);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 1000);
        assert_eq!(batches[2].len(), 501);
        assert_eq!(batches[2][500], "k2500");
    }
}
