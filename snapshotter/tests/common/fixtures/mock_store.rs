//! In-memory `ObjectStore` recording writes and prefix deletions

use async_trait::async_trait;
use snapshotter::errors::{Result, SnapshotError};
use snapshotter::storage::ObjectStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

pub struct MockObjectStore {
    bucket_name: String,
    root_prefix: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    deleted_prefixes: Mutex<Vec<String>>,
    failing_prefixes: Mutex<HashSet<String>>,
    fail_puts: bool,
}

impl MockObjectStore {
    pub fn new(bucket_name: &str) -> Self {
        Self {
            bucket_name: bucket_name.to_string(),
            root_prefix: String::new(),
            objects: Mutex::new(BTreeMap::new()),
            deleted_prefixes: Mutex::new(Vec::new()),
            failing_prefixes: Mutex::new(HashSet::new()),
            fail_puts: false,
        }
    }

    /// Store with no bucket configured
    pub fn unconfigured() -> Self {
        Self::new("")
    }

    pub fn with_root_prefix(mut self, prefix: &str) -> Self {
        self.root_prefix = prefix.to_string();
        self
    }

    pub fn with_failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    pub fn fail_prefix(&self, prefix: &str) {
        self.failing_prefixes
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn object(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn deleted_prefixes(&self) -> Vec<String> {
        self.deleted_prefixes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(&self, key: &str, content: Vec<u8>) -> Result<()> {
        if self.fail_puts {
            return Err(SnapshotError::Storage(format!("failed to put {}", key)));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        if self.failing_prefixes.lock().unwrap().contains(prefix) {
            return Err(SnapshotError::Storage(format!(
                "failed to delete objects under {}",
                prefix
            )));
        }
        self.deleted_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());

        let mut objects = self.objects.lock().unwrap();
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }

    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    fn endpoint(&self) -> &str {
        "http://localhost:9000"
    }

    fn region(&self) -> &str {
        "us-east-1"
    }

    fn root_prefix(&self) -> &str {
        &self.root_prefix
    }
}
