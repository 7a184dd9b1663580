//! Storage backends
//!
//! Every provider implements [`StorageBackend`]. Exactly one backend is
//! constructed at startup from [`StorageConfig`] and shared read-only as an
//! `Arc<dyn StorageBackend>`.
//!
//! # Capabilities
//!
//! | Backend | put | delete | sign | list |
//! |---------|-----|--------|------|------|
//! | [`S3Storage`] | yes | yes | yes | yes |
//! | [`CloudinaryStorage`] | yes | yes | no | yes |
//! | [`MemoryStorage`] | yes | yes | yes | yes |
//!
//! Calling an operation a backend does not declare fails with
//! [`StorageError::Unsupported`] before any I/O.
//!
//! # Failures
//!
//! Transport, authentication and provider errors are wrapped in
//! [`StorageError::Backend`] with the provider's own message. Nothing is
//! retried here; retry policy belongs to the caller.

use crate::config::StorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod cloudinary;
pub mod memory;
pub mod s3;

pub use cloudinary::CloudinaryStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// Longest signed URL lifetime any backend accepts (S3 presigning caps at seven days)
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 604_800;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{provider} error: {message}")]
    Backend {
        provider: &'static str,
        message: String,
    },

    #[error("{capability} is not supported by the {provider} backend")]
    Unsupported {
        provider: &'static str,
        capability: Capability,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn backend(provider: &'static str, message: impl Into<String>) -> Self {
        StorageError::Backend {
            provider,
            message: message.into(),
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Backend { .. } => "backend",
            StorageError::Unsupported { .. } => "unsupported",
            StorageError::NotFound(_) => "not_found",
            StorageError::ConfigError(_) => "config",
        }
    }
}

/// One operation of the common backend contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Put,
    Delete,
    Sign,
    List,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Put => "put",
            Capability::Delete => "delete",
            Capability::Sign => "sign",
            Capability::List => "list",
        };
        f.write_str(name)
    }
}

/// Set of operations a backend implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub put: bool,
    pub delete: bool,
    pub sign: bool,
    pub list: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        put: true,
        delete: true,
        sign: true,
        list: true,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Put => self.put,
            Capability::Delete => self.delete,
            Capability::Sign => self.sign,
            Capability::List => self.list,
        }
    }

    pub fn without(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Put => self.put = false,
            Capability::Delete => self.delete = false,
            Capability::Sign => self.sign = false,
            Capability::List => self.list = false,
        }
        self
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = [
            Capability::Put,
            Capability::Delete,
            Capability::Sign,
            Capability::List,
        ]
        .into_iter()
        .filter(|c| self.supports(*c))
        .map(|c| c.to_string())
        .collect();
        f.write_str(&names.join(","))
    }
}

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Public or canonical URL of the object
    pub url: String,
    /// Backend identifier; may differ from the requested key
    pub key: String,
}

/// Normalized listing entry, identical in shape for every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
}

/// Common contract of every storage provider.
///
/// Implementations must be safe to call concurrently for distinct keys and
/// hold no per-call locks across I/O.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Provider label, e.g. `s3`
    fn provider(&self) -> &'static str;

    /// Operations this backend implements
    fn capabilities(&self) -> Capabilities;

    /// Store `body` under `key`
    async fn put(
        &self,
        body: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Delete the object at `key`. Missing keys are reported however the provider reports them.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Mint a time-limited read URL
    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let _ = (key, ttl);
        Err(StorageError::Unsupported {
            provider: self.provider(),
            capability: Capability::Sign,
        })
    }

    /// Enumerate every object under `prefix`, fully materialized
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, StorageError> {
        let _ = prefix;
        Err(StorageError::Unsupported {
            provider: self.provider(),
            capability: Capability::List,
        })
    }
}

/// Construct the configured backend
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend: Arc<dyn StorageBackend> = match config {
        StorageConfig::S3(s3) => Arc::new(S3Storage::new(s3).await?),
        StorageConfig::Cloudinary(cloudinary) => Arc::new(CloudinaryStorage::new(cloudinary)?),
        StorageConfig::Memory(memory) => {
            tracing::warn!("Using in-memory storage; objects are lost on restart");
            Arc::new(MemoryStorage::new(&memory.public_base_url))
        }
    };

    tracing::info!(
        provider = backend.provider(),
        capabilities = %backend.capabilities(),
        "Storage backend initialized"
    );

    Ok(backend)
}
