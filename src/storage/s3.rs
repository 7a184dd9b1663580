//! S3 storage backend
//!
//! Direct object-store adapter on top of `aws-sdk-s3`. Objects are addressed
//! by literal key inside one bucket and written with the `public-read` canned
//! ACL unless disabled.
//!
//! # Credentials
//!
//! When `access_key`/`secret_key` are configured they are used as static
//! credentials. Otherwise the AWS default provider chain applies
//! (environment, shared profile, instance metadata).
//!
//! # Retries
//!
//! The SDK's retry layer is disabled: each call reaches S3 at most once and
//! failures surface to the caller unchanged.
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PutObject | `s3.put_object` | bucket, key, bytes, content_type, etag |
//! | DeleteObject | `s3.delete_object` | bucket, key |
//! | GetObject (presigned) | `s3.presign_get_object` | bucket, key, ttl |
//! | ListObjectsV2 | `s3.list_objects` | bucket, prefix, pages, objects |

use super::{Capabilities, ObjectEntry, StorageBackend, StorageError, StoredObject};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;

const PROVIDER: &str = "s3";

/// Characters left unescaped in object URLs (RFC 3986 unreserved plus `/`)
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn sdk_error<E: std::error::Error>(err: E) -> StorageError {
    StorageError::backend(PROVIDER, DisplayErrorContext(err).to_string())
}

/// S3 storage backend
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    public_read: bool,
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Build the SDK client from configuration
    pub async fn new(config: &S3Config) -> Result<Self, StorageError> {
        let region = Region::new(config.region.clone());

        let builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "media-gateway-config",
                )),
            (None, None) => {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&sdk_config)
            }
            _ => {
                return Err(StorageError::ConfigError(
                    "access_key and secret_key must be set together".into(),
                ))
            }
        };

        let mut builder = builder.retry_config(RetryConfig::disabled());
        if let Some(ref endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::with_client(Client::from_conf(builder.build()), config))
    }

    /// Wrap an already configured SDK client
    pub fn with_client(client: Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            public_read: config.public_read,
            public_base_url: config.public_base_url.clone(),
        }
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Canonical URL of an object.
    ///
    /// `public_base_url` wins when configured; custom endpoints use path-style
    /// addressing; plain AWS uses the virtual-hosted regional form.
    pub fn object_url(&self, key: &str) -> String {
        let encoded = utf8_percent_encode(key, KEY_ENCODE_SET);
        if let Some(ref base) = self.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), encoded);
        }
        match self.endpoint {
            Some(ref endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                encoded
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        }
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            upload.bytes = body.len(),
            http.content_type = %content_type,
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        body: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body));
        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        let response = request.send().await.map_err(sdk_error)?;

        if let Some(etag) = response.e_tag() {
            tracing::Span::current().record("s3.etag", etag);
        }
        tracing::info!("PutObject completed");

        Ok(StoredObject {
            url: self.object_url(key),
            key: key.to_string(),
        })
    }

    #[tracing::instrument(
        name = "s3.delete_object",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key),
        err
    )]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;

        tracing::info!("DeleteObject completed");
        Ok(())
    }

    #[tracing::instrument(
        name = "s3.presign_get_object",
        skip(self),
        fields(s3.bucket = %self.bucket, s3.key = %key, ttl_secs = ttl.as_secs()),
        err
    )]
    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::backend(PROVIDER, e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(sdk_error)?;

        Ok(request.uri().to_string())
    }

    #[tracing::instrument(
        name = "s3.list_objects",
        skip(self),
        fields(
            s3.bucket = %self.bucket,
            s3.prefix = ?prefix,
            s3.pages = tracing::field::Empty,
            s3.objects = tracing::field::Empty
        ),
        err
    )]
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(sdk_error)?;
            pages += 1;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                entries.push(ObjectEntry {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                    checksum: object.e_tag().map(str::to_string),
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        let span = tracing::Span::current();
        span.record("s3.pages", pages);
        span.record("s3.objects", entries.len());

        Ok(entries)
    }
}
