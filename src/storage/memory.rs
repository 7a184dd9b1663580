//! In-memory storage backend
//!
//! Keeps objects in a process-local map. Intended for local development and
//! tests; nothing survives a restart.

use super::{Capabilities, ObjectEntry, StorageBackend, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

const PROVIDER: &str = "memory";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    checksum: String,
    stored_at: DateTime<Utc>,
}

/// Process-local storage backend
#[derive(Debug)]
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryStorage {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    /// Stored bytes and content type for `key`
    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects
            .read()
            .get(key)
            .map(|o| (o.data.clone(), o.content_type.clone()))
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    /// Quoted hex SHA-256, shaped like an ETag
    fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn put(
        &self,
        body: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let object = MemoryObject {
            checksum: Self::compute_checksum(&body),
            data: body,
            content_type: content_type.to_string(),
            stored_at: Utc::now(),
        };
        self.objects.write().insert(key.to_string(), object);

        tracing::debug!(key = %key, "Stored object in memory");

        Ok(StoredObject {
            url: self.url(key),
            key: key.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.objects.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let expires = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or_else(|| {
                StorageError::backend(PROVIDER, format!("expiry {}s out of range", ttl.as_secs()))
            })?;
        Ok(format!("{}?expires={}", self.url(key), expires))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, StorageError> {
        let prefix = prefix.unwrap_or("");
        let entries = self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectEntry {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.stored_at),
                checksum: Some(object.checksum.clone()),
            })
            .collect();
        Ok(entries)
    }
}
