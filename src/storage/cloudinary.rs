//! Cloudinary storage backend
//!
//! Managed-media adapter over the Cloudinary REST API.
//!
//! - **Ingestion** is stream-based: the payload is chunked into a bounded
//!   channel that feeds the multipart request body.
//! - **Keys** are the `public_id` assigned by Cloudinary. The generated key
//!   is sent as a hint (minus its extension) but the returned id is
//!   authoritative.
//! - **Signed URLs** are not offered; `sign_url` fails with `Unsupported`.
//! - **Listing** uses the Admin API with basic auth and follows
//!   `next_cursor` until exhausted.
//!
//! Uploads go through the `auto` resource type, so Cloudinary files a video
//! under `video` and a text file under `raw`. Keys carry no resource type:
//! destroy tries each type in turn (the configured `resource_type` first)
//! until one reports the asset, and listing merges every type.

use super::{Capabilities, Capability, ObjectEntry, StorageBackend, StorageError, StoredObject};
use crate::config::{CloudinaryConfig, SignatureAlgorithm};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use futures::SinkExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

const PROVIDER: &str = "cloudinary";

/// Size of each chunk pushed into the ingestion channel
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered ahead of the HTTP body
const CHANNEL_DEPTH: usize = 4;

/// Page size for Admin API listing
const LIST_PAGE_SIZE: &str = "500";

/// Resource types `auto` uploads can land in
const RESOURCE_TYPES: [&str; 3] = ["image", "video", "raw"];

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    resources: Vec<Resource>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    public_id: String,
    #[serde(default)]
    bytes: u64,
    created_at: Option<DateTime<Utc>>,
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn http_error(err: reqwest::Error) -> StorageError {
    StorageError::backend(PROVIDER, err.to_string())
}

/// Turn a non-2xx response into a backend error carrying Cloudinary's message
async fn error_from_response(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    StorageError::backend(PROVIDER, format!("{} (HTTP {})", message, status.as_u16()))
}

/// Hint sent as `public_id`: the key without the extension of its last segment
fn public_id_hint(key: &str) -> &str {
    match key.rsplit_once('.') {
        Some((stem, extension))
            if !stem.is_empty() && !stem.ends_with('/') && !extension.contains('/') =>
        {
            stem
        }
        _ => key,
    }
}

fn resource_search_order(preferred: &str) -> Vec<String> {
    std::iter::once(preferred)
        .chain(RESOURCE_TYPES.into_iter().filter(|t| *t != preferred))
        .map(str::to_string)
        .collect()
}

/// Pipe `data` through a bounded channel into a streaming request body
fn ingestion_body(data: Bytes) -> reqwest::Body {
    let (mut tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(CHANNEL_DEPTH);

    tokio::spawn(async move {
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + CHUNK_SIZE).min(data.len());
            // Receiver dropped: the request was abandoned
            if tx.send(Ok(data.slice(offset..end))).await.is_err() {
                break;
            }
            offset = end;
        }
    });

    reqwest::Body::wrap_stream(rx)
}

/// Cloudinary storage backend
pub struct CloudinaryStorage {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base_url: String,
    /// Configured type first, then the remaining ones
    resource_types: Vec<String>,
    signature_algorithm: SignatureAlgorithm,
}

impl CloudinaryStorage {
    pub fn new(config: &CloudinaryConfig) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            http,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            resource_types: resource_search_order(&config.resource_type),
            signature_algorithm: config.signature_algorithm,
        })
    }

    pub fn cloud_name(&self) -> &str {
        &self.cloud_name
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1_1/{}/{}", self.api_base_url, self.cloud_name, path)
    }

    /// Request signature: sorted `k=v` pairs joined by `&`, suffixed with the
    /// API secret, hex digest.
    pub fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut payload = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        payload.push_str(&self.api_secret);

        match self.signature_algorithm {
            SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
            SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
        }
    }

    fn timestamp() -> String {
        Utc::now().timestamp().to_string()
    }
}

#[async_trait]
impl StorageBackend for CloudinaryStorage {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL.without(Capability::Sign)
    }

    #[tracing::instrument(
        name = "cloudinary.upload",
        skip(self, body),
        fields(
            cloudinary.cloud = %self.cloud_name,
            storage.key = %key,
            upload.bytes = body.len(),
            http.content_type = %content_type,
            cloudinary.public_id = tracing::field::Empty
        ),
        err
    )]
    async fn put(
        &self,
        body: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let public_id = public_id_hint(key);
        let timestamp = Self::timestamp();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        let length = body.len() as u64;
        let part = Part::stream_with_length(ingestion_body(body), length)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(http_error)?;

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("public_id", public_id.to_string())
            .text("signature", signature)
            .part("file", part);

        let response = self
            .http
            .post(self.endpoint("auto/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(http_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let uploaded: UploadResponse = response.json().await.map_err(http_error)?;
        tracing::Span::current().record("cloudinary.public_id", uploaded.public_id.as_str());
        tracing::info!(url = %uploaded.secure_url, "Cloudinary upload completed");

        Ok(StoredObject {
            url: uploaded.secure_url,
            key: uploaded.public_id,
        })
    }

    #[tracing::instrument(
        name = "cloudinary.destroy",
        skip(self),
        fields(
            cloudinary.cloud = %self.cloud_name,
            cloudinary.public_id = %key,
            cloudinary.resource_type = tracing::field::Empty
        ),
        err
    )]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        for resource_type in &self.resource_types {
            if self.destroy(resource_type, key).await? {
                tracing::Span::current().record("cloudinary.resource_type", resource_type.as_str());
                tracing::info!("Cloudinary destroy completed");
                return Ok(());
            }
        }
        Err(StorageError::NotFound(key.to_string()))
    }

    #[tracing::instrument(
        name = "cloudinary.list_resources",
        skip(self),
        fields(cloudinary.cloud = %self.cloud_name, prefix = ?prefix),
        err
    )]
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        for resource_type in &self.resource_types {
            self.list_resource_type(resource_type, prefix, &mut entries)
                .await?;
        }

        tracing::debug!(objects = entries.len(), "Cloudinary listing completed");
        Ok(entries)
    }
}

impl CloudinaryStorage {
    /// Destroy `key` under one resource type; `Ok(false)` when it is not there
    async fn destroy(&self, resource_type: &str, key: &str) -> Result<bool, StorageError> {
        let timestamp = Self::timestamp();
        let signature = self.sign(&[("public_id", key), ("timestamp", &timestamp)]);

        let response = self
            .http
            .post(self.endpoint(&format!("{}/destroy", resource_type)))
            .form(&[
                ("public_id", key),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .map_err(http_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let destroyed: DestroyResponse = response.json().await.map_err(http_error)?;
        match destroyed.result.as_str() {
            "ok" => Ok(true),
            "not found" => Ok(false),
            other => Err(StorageError::backend(
                PROVIDER,
                format!("destroy returned '{}'", other),
            )),
        }
    }

    /// Append every resource of one type under `prefix`, following `next_cursor`
    async fn list_resource_type(
        &self,
        resource_type: &str,
        prefix: Option<&str>,
        entries: &mut Vec<ObjectEntry>,
    ) -> Result<(), StorageError> {
        let url = self.endpoint(&format!("resources/{}/upload", resource_type));
        let mut cursor: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("max_results", LIST_PAGE_SIZE.to_string())];
            if let Some(prefix) = prefix {
                query.push(("prefix", prefix.to_string()));
            }
            if let Some(next) = cursor.take() {
                query.push(("next_cursor", next));
            }

            let response = self
                .http
                .get(&url)
                .basic_auth(&self.api_key, Some(&self.api_secret))
                .query(&query)
                .send()
                .await
                .map_err(http_error)?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            let page: ListResponse = response.json().await.map_err(http_error)?;
            entries.extend(page.resources.into_iter().map(|r| ObjectEntry {
                key: r.public_id,
                size: r.bytes,
                last_modified: r.created_at,
                checksum: r.etag,
            }));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }
}
