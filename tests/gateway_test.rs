//! Upload Gateway Integration Tests
//!
//! Exercises the gateway against the in-memory backend wrapped in a
//! call-counting adapter, plus a backend that always fails.

use async_trait::async_trait;
use bytes::Bytes;
use media_gateway::config::UploadConfig;
use media_gateway::storage::{
    Capabilities, Capability, MemoryStorage, ObjectEntry, StorageBackend, StorageError,
    StoredObject,
};
use media_gateway::upload::{UploadError, UploadGateway, UploadMetadata, UploadedFile};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory backend that counts every call
struct CountingStorage {
    inner: MemoryStorage,
    puts: AtomicUsize,
    calls: AtomicUsize,
    capabilities: Capabilities,
}

impl CountingStorage {
    fn new() -> Self {
        Self::with_capabilities(Capabilities::ALL)
    }

    fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            inner: MemoryStorage::new("http://localhost/files"),
            puts: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            capabilities,
        }
    }

    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingStorage {
    fn provider(&self) -> &'static str {
        "counting"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn put(
        &self,
        body: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(body, key, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_url(key, ttl).await
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }
}

/// Backend whose every call fails like a rejected request
struct FailingStorage;

#[async_trait]
impl StorageBackend for FailingStorage {
    fn provider(&self) -> &'static str {
        "failing"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn put(&self, _: Bytes, _: &str, _: &str) -> Result<StoredObject, StorageError> {
        Err(StorageError::backend("failing", "AccessDenied: Access Denied"))
    }

    async fn delete(&self, _: &str) -> Result<(), StorageError> {
        Err(StorageError::backend("failing", "AccessDenied: Access Denied"))
    }
}

fn gateway_with(backend: Arc<CountingStorage>) -> UploadGateway {
    UploadGateway::new(backend, &UploadConfig::default())
}

fn png(name: &str, size: usize) -> UploadedFile {
    UploadedFile::new(name, "image/png", vec![0u8; size])
}

#[tokio::test]
async fn test_photo_upload_scenario() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let object = gateway
        .upload_file(
            png("photo.png", 2 * 1024 * 1024),
            &UploadMetadata::with_category("products"),
        )
        .await
        .unwrap();

    assert!(object.key.starts_with("products/"));
    assert!(object.key.ends_with("-photo.png"));
    assert_eq!(object.size, 2_097_152);
    assert_eq!(object.mime_type, "image/png");
    assert_eq!(object.filename, "photo.png");
    assert_eq!(backend.puts(), 1);
    assert!(backend.inner.contains(&object.key));
}

#[tokio::test]
async fn test_oversized_file_rejected_regardless_of_type() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    for mime in ["image/png", "application/zip", "text/plain"] {
        let file = UploadedFile::new("big.bin", mime, vec![0u8; 10 * 1024 * 1024 + 1]);
        let result = gateway.upload_file(file, &UploadMetadata::default()).await;
        assert!(
            matches!(result, Err(UploadError::FileTooLarge { .. })),
            "expected FileTooLarge for {}",
            mime
        );
    }
    assert_eq!(backend.puts(), 0);
}

#[tokio::test]
async fn test_exactly_limit_is_accepted() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let result = gateway
        .upload_file(png("edge.png", 10 * 1024 * 1024), &UploadMetadata::default())
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_zip_rejected_without_backend_call() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let file = UploadedFile::new("archive.zip", "application/zip", vec![1u8; 128]);
    let err = gateway
        .upload_file(file, &UploadMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::UnsupportedMediaType(_)));
    assert!(err.to_string().contains("application/zip"));
    assert_eq!(backend.puts(), 0);
}

#[tokio::test]
async fn test_empty_batch_makes_no_backend_calls() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let result = gateway
        .upload_multiple_files(Vec::new(), &UploadMetadata::default())
        .await;

    assert!(matches!(result, Err(UploadError::InvalidFile(_))));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let files = vec![png("one.png", 10), png("two.png", 20), png("three.png", 30)];
    let objects = gateway
        .upload_multiple_files(files, &UploadMetadata::with_category("gallery"))
        .await
        .unwrap();

    assert_eq!(objects.len(), 3);
    assert!(objects[0].key.ends_with("-one.png"));
    assert!(objects[1].key.ends_with("-two.png"));
    assert!(objects[2].key.ends_with("-three.png"));
    assert_eq!(
        objects.iter().map(|o| o.size).collect::<Vec<_>>(),
        vec![10, 20, 30]
    );
    assert!(objects.iter().all(|o| o.key.starts_with("gallery/")));
    assert_eq!(backend.puts(), 3);
}

#[tokio::test]
async fn test_batch_failure_returns_no_refs_and_leaves_siblings() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let files = vec![
        png("first.png", 10),
        UploadedFile::new("second.zip", "application/zip", vec![0u8; 10]),
        png("third.png", 10),
    ];
    let result = gateway
        .upload_multiple_files(files, &UploadMetadata::with_category("batch"))
        .await;

    assert!(matches!(result, Err(UploadError::UnsupportedMediaType(_))));

    // Not rolled back: the first file's object is still stored
    let stored = gateway.list_files(Some("batch/")).await.unwrap();
    assert!(stored.iter().any(|e| e.key.ends_with("-first.png")));
    assert!(!stored.iter().any(|e| e.key.ends_with("-second.zip")));
}

#[tokio::test]
async fn test_upload_then_delete_round_trip() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let object = gateway
        .upload_file(png("photo.png", 64), &UploadMetadata::with_category("products"))
        .await
        .unwrap();
    let listed = gateway.list_files(Some("products")).await.unwrap();
    assert!(listed.iter().any(|e| e.key == object.key));

    gateway.delete_file(&object.key).await.unwrap();

    let listed = gateway.list_files(Some("products")).await.unwrap();
    assert!(!listed.iter().any(|e| e.key == object.key));
}

#[tokio::test]
async fn test_listing_is_normalized() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let object = gateway
        .upload_file(
            UploadedFile::new("a.txt", "text/plain", "hello"),
            &UploadMetadata::default(),
        )
        .await
        .unwrap();

    let entries = gateway.list_files(None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, object.key);
    assert_eq!(entries[0].size, 5);
    assert!(entries[0].last_modified.is_some());
    assert!(entries[0].checksum.is_some());
}

#[tokio::test]
async fn test_signed_url_default_and_custom_ttl() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend.clone());

    let object = gateway
        .upload_file(png("a.png", 1), &UploadMetadata::default())
        .await
        .unwrap();

    let url = gateway.get_signed_url(&object.key, None).await.unwrap();
    assert!(url.contains("expires="));
    let url = gateway
        .get_signed_url(&object.key, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(url.contains("expires="));
}

#[tokio::test]
async fn test_unsupported_capability_fails_fast() {
    let backend = Arc::new(CountingStorage::with_capabilities(
        Capabilities::ALL.without(Capability::Sign),
    ));
    let gateway = gateway_with(backend.clone());

    let err = gateway.get_signed_url("any", None).await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::Storage(StorageError::Unsupported {
            capability: Capability::Sign,
            ..
        })
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_backend_errors_surface_unchanged() {
    let gateway = UploadGateway::new(Arc::new(FailingStorage), &UploadConfig::default());

    let err = gateway
        .upload_file(png("a.png", 1), &UploadMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Storage(StorageError::Backend { .. })));
    assert!(err.to_string().contains("AccessDenied"));

    let err = gateway.delete_file("k").await.unwrap_err();
    assert_eq!(err.kind(), "backend");
}

#[tokio::test]
async fn test_delete_missing_key_is_reported() {
    let backend = Arc::new(CountingStorage::new());
    let gateway = gateway_with(backend);

    let err = gateway.delete_file("nope/missing.png").await.unwrap_err();
    assert!(matches!(err, UploadError::Storage(StorageError::NotFound(_))));
}
