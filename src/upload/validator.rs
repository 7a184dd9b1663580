//! File validation
//!
//! Size and MIME-type policy applied to a single file before any network call.

use super::{UploadError, UploadedFile};
use crate::config::UploadConfig;

/// 10MB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "application/pdf",
    "text/plain",
    "video/mp4",
    "video/webm",
];

/// Upload policy.
///
/// Rules are checked in order and the first failure wins: size, then MIME
/// type. The declared MIME type is trusted as-is.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_mime_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
        }
    }
}

impl UploadPolicy {
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allows(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime_type)
    }

    pub fn validate(&self, file: &UploadedFile) -> Result<(), UploadError> {
        if file.size > self.max_file_size {
            return Err(UploadError::FileTooLarge {
                size: file.size,
                limit: self.max_file_size,
            });
        }

        if !self.allows(&file.mime_type) {
            return Err(UploadError::UnsupportedMediaType(file.mime_type.clone()));
        }

        Ok(())
    }
}
