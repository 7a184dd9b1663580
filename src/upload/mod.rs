//! Upload module
//!
//! Validates incoming files, derives storage keys and hands the bytes to the
//! configured storage backend through [`gateway::UploadGateway`].

use crate::storage::StorageError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gateway;
pub mod key;
pub mod validator;

pub use gateway::UploadGateway;
pub use key::KeyGenerator;
pub use validator::UploadPolicy;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// No file attached, or an empty batch
    #[error("{0}")]
    InvalidFile(String),

    #[error("File size exceeds {}MB limit", .limit / (1024 * 1024))]
    FileTooLarge { size: u64, limit: u64 },

    #[error("File type '{0}' not allowed")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl UploadError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::InvalidFile(_) => "invalid_file",
            UploadError::FileTooLarge { .. } => "file_too_large",
            UploadError::UnsupportedMediaType(_) => "unsupported_media_type",
            UploadError::Storage(e) => e.kind(),
        }
    }
}

/// A file received from a client. Lives for one request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub data: Bytes,
    /// Original filename as sent by the client
    pub filename: String,
    /// Declared MIME type; content is never sniffed
    pub mime_type: String,
    pub size: u64,
}

impl UploadedFile {
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Caller-supplied hints for a single upload or a batch
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    /// Logical folder; becomes the first key segment
    pub category: Option<String>,
    pub description: Option<String>,
}

impl UploadMetadata {
    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            description: None,
        }
    }
}

/// Reference to a stored object, returned once per successful upload.
///
/// `key` is the only handle accepted by delete, sign and list. It is opaque:
/// callers store it as-is and never rebuild it from the other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObjectRef {
    pub url: String,
    pub key: String,
    pub filename: String,
    pub size: u64,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}
