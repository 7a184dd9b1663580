//! Upload gateway
//!
//! Orchestrates validation, key generation and the backend call for single
//! and batch uploads, and passes delete/sign/list through to the active
//! backend after checking its declared capabilities.
//!
//! # Example
//!
//! ```no_run
//! use media_gateway::config::UploadConfig;
//! use media_gateway::storage::MemoryStorage;
//! use media_gateway::upload::{UploadGateway, UploadMetadata, UploadedFile};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), media_gateway::upload::UploadError> {
//! let backend = Arc::new(MemoryStorage::new("http://localhost:3001/files"));
//! let gateway = UploadGateway::new(backend, &UploadConfig::default());
//!
//! let file = UploadedFile::new("photo.png", "image/png", vec![0u8; 1024]);
//! let object = gateway
//!     .upload_file(file, &UploadMetadata::with_category("products"))
//!     .await?;
//! assert!(object.key.starts_with("products/"));
//! # Ok(())
//! # }
//! ```
//!
//! # Batches
//!
//! Files of a batch are uploaded concurrently, at most `batch_concurrency`
//! at a time. Every file runs to completion; if any failed, the first
//! failure in input order is returned and no refs are. Objects already
//! written for the other files stay in the backend.

use super::key::KeyGenerator;
use super::validator::UploadPolicy;
use super::{StorageObjectRef, UploadError, UploadMetadata, UploadedFile};
use crate::config::UploadConfig;
use crate::metrics;
use crate::storage::{Capability, ObjectEntry, StorageBackend, StorageError};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upload gateway over one storage backend
#[derive(Clone)]
pub struct UploadGateway {
    backend: Arc<dyn StorageBackend>,
    policy: UploadPolicy,
    keys: KeyGenerator,
    batch_concurrency: usize,
    default_ttl: Duration,
}

impl UploadGateway {
    pub fn new(backend: Arc<dyn StorageBackend>, config: &UploadConfig) -> Self {
        Self {
            backend,
            policy: UploadPolicy::from(config),
            keys: KeyGenerator::new(config.key_format),
            batch_concurrency: config.batch_concurrency.max(1),
            default_ttl: Duration::from_secs(config.signed_url_ttl_seconds),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    fn require(&self, capability: Capability) -> Result<(), StorageError> {
        if self.backend.capabilities().supports(capability) {
            Ok(())
        } else {
            Err(StorageError::Unsupported {
                provider: self.backend.provider(),
                capability,
            })
        }
    }

    fn observe(&self, operation: &str, started: Instant) {
        metrics::record_storage_operation(
            self.backend.provider(),
            operation,
            started.elapsed().as_secs_f64(),
        );
    }

    /// Validate, key and store a single file
    #[tracing::instrument(
        name = "upload.file",
        skip(self, file, metadata),
        fields(
            storage.provider = self.backend.provider(),
            upload.filename = %file.filename,
            upload.bytes = file.size,
            upload.content_type = %file.mime_type,
            storage.key = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_file(
        &self,
        file: UploadedFile,
        metadata: &UploadMetadata,
    ) -> Result<StorageObjectRef, UploadError> {
        if let Err(e) = self.policy.validate(&file) {
            metrics::record_validation_rejection(e.kind());
            return Err(e);
        }

        let key = self.keys.generate(&file.filename, metadata.category.as_deref());
        tracing::Span::current().record("storage.key", key.as_str());

        let provider = self.backend.provider();
        let started = Instant::now();
        let result = self.backend.put(file.data, &key, &file.mime_type).await;
        self.observe("put", started);

        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                metrics::record_upload_failure(provider);
                return Err(e.into());
            }
        };

        metrics::record_upload_success(provider, file.size);
        tracing::info!(url = %stored.url, "Upload completed");

        Ok(StorageObjectRef {
            url: stored.url,
            key: stored.key,
            filename: file.filename,
            size: file.size,
            mime_type: file.mime_type,
            uploaded_at: Utc::now(),
        })
    }

    /// Upload every file of a batch; all-or-nothing at the response level
    #[tracing::instrument(
        name = "upload.batch",
        skip(self, files, metadata),
        fields(
            storage.provider = self.backend.provider(),
            upload.files = files.len(),
            upload.concurrency = self.batch_concurrency
        ),
        err
    )]
    pub async fn upload_multiple_files(
        &self,
        files: Vec<UploadedFile>,
        metadata: &UploadMetadata,
    ) -> Result<Vec<StorageObjectRef>, UploadError> {
        if files.is_empty() {
            return Err(UploadError::InvalidFile("No files provided".into()));
        }

        let results: Vec<Result<StorageObjectRef, UploadError>> = stream::iter(files)
            .map(|file| self.upload_file(file, metadata))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let mut stored = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(object) => stored.push(object),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }

        match first_error {
            None => Ok(stored),
            Some(e) => {
                if !stored.is_empty() {
                    let orphaned: Vec<&str> = stored.iter().map(|o| o.key.as_str()).collect();
                    tracing::error!(
                        orphaned = ?orphaned,
                        "Batch failed; objects already stored for other files are left in place"
                    );
                }
                Err(e)
            }
        }
    }

    #[tracing::instrument(
        name = "upload.delete",
        skip(self),
        fields(storage.provider = self.backend.provider()),
        err
    )]
    pub async fn delete_file(&self, key: &str) -> Result<(), UploadError> {
        self.require(Capability::Delete)?;

        let started = Instant::now();
        let result = self.backend.delete(key).await;
        self.observe("delete", started);
        result?;

        tracing::info!("Object deleted");
        Ok(())
    }

    /// Time-limited read URL; `ttl` defaults to `signed_url_ttl_seconds`
    #[tracing::instrument(
        name = "upload.signed_url",
        skip(self),
        fields(storage.provider = self.backend.provider()),
        err
    )]
    pub async fn get_signed_url(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<String, UploadError> {
        self.require(Capability::Sign)?;

        let started = Instant::now();
        let result = self
            .backend
            .sign_url(key, ttl.unwrap_or(self.default_ttl))
            .await;
        self.observe("sign", started);
        Ok(result?)
    }

    /// Normalized listing under `prefix`; an empty prefix lists everything
    #[tracing::instrument(
        name = "upload.list",
        skip(self),
        fields(storage.provider = self.backend.provider()),
        err
    )]
    pub async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, UploadError> {
        self.require(Capability::List)?;

        let prefix = prefix.filter(|p| !p.is_empty());
        let started = Instant::now();
        let result = self.backend.list(prefix).await;
        self.observe("list", started);
        Ok(result?)
    }
}
