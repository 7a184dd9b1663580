//! Configuration module for the media gateway
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, environment-only configuration for
//! container deployments, and validation of the whole tree before the
//! storage backend is constructed.
//!
//! Configuration is read once at startup and treated as immutable for the
//! lifetime of the process.

use crate::storage::MAX_SIGNED_URL_TTL_SECS;
use crate::upload::validator::{DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_FILE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A `${VAR}` placeholder survived expansion because the variable was unset.
fn is_unresolved(value: &str) -> bool {
    value.contains("${")
}

fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{} cannot be empty",
            field
        )));
    }
    if is_unresolved(value) {
        return Err(ConfigError::ValidationError(format!(
            "{} references an unset environment variable: {}",
            field, value
        )));
    }
    Ok(())
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.server.path_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid path_prefix '{}': must start with '/' and not end with '/'",
                prefix
            )));
        }

        if self.server.max_request_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_request_size must be greater than zero".into(),
            ));
        }

        match &self.storage {
            StorageConfig::S3(s3) => {
                require("storage.bucket", &s3.bucket)?;
                require("storage.region", &s3.region)?;
                if let Some(ref endpoint) = s3.endpoint {
                    if !is_valid_http_url(endpoint) {
                        return Err(ConfigError::ValidationError(
                            "Invalid S3 endpoint: must start with http:// or https://".into(),
                        ));
                    }
                }
                // Keys are optional (default credential chain) but must come in pairs
                match (&s3.access_key, &s3.secret_key) {
                    (Some(access), Some(secret)) => {
                        require("storage.access_key", access)?;
                        require("storage.secret_key", secret)?;
                    }
                    (None, None) => {}
                    _ => {
                        return Err(ConfigError::ValidationError(
                            "access_key and secret_key must be set together".into(),
                        ))
                    }
                }
                if let Some(ref base) = s3.public_base_url {
                    if !is_valid_http_url(base) {
                        return Err(ConfigError::ValidationError(
                            "Invalid public_base_url: must start with http:// or https://".into(),
                        ));
                    }
                }
            }
            StorageConfig::Cloudinary(cloudinary) => {
                require("storage.cloud_name", &cloudinary.cloud_name)?;
                require("storage.api_key", &cloudinary.api_key)?;
                require("storage.api_secret", &cloudinary.api_secret)?;
                if !is_valid_http_url(&cloudinary.api_base_url) {
                    return Err(ConfigError::ValidationError(
                        "Invalid api_base_url: must start with http:// or https://".into(),
                    ));
                }
                match cloudinary.resource_type.as_str() {
                    "image" | "video" | "raw" => {}
                    other => {
                        return Err(ConfigError::ValidationError(format!(
                            "Invalid resource_type '{}': must be 'image', 'video', or 'raw'",
                            other
                        )))
                    }
                }
            }
            StorageConfig::Memory(memory) => {
                if !is_valid_http_url(&memory.public_base_url) {
                    return Err(ConfigError::ValidationError(
                        "Invalid public_base_url: must start with http:// or https://".into(),
                    ));
                }
            }
        }

        let upload = &self.upload;
        if upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_file_size must be greater than zero".into(),
            ));
        }
        if upload.allowed_mime_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "allowed_mime_types cannot be empty".into(),
            ));
        }
        if upload.max_files == 0 {
            return Err(ConfigError::ValidationError(
                "max_files must be at least 1".into(),
            ));
        }
        if upload.batch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "batch_concurrency must be at least 1".into(),
            ));
        }
        if upload.signed_url_ttl_seconds == 0
            || upload.signed_url_ttl_seconds > MAX_SIGNED_URL_TTL_SECS
        {
            return Err(ConfigError::ValidationError(format!(
                "Invalid signed_url_ttl_seconds {}: must be between 1 and {}",
                upload.signed_url_ttl_seconds, MAX_SIGNED_URL_TTL_SECS
            )));
        }

        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid metrics path '{}': must start with '/'",
                self.metrics.path
            )));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Global route prefix, e.g. `/api` for `/api/upload/file`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// Upper bound on a single request body, multipart framing included
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            path_prefix: default_path_prefix(),
            max_request_size: default_max_request_size(),
            cors: CorsConfig::default(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

fn default_max_request_size() -> usize {
    134217728 // 128MB
}

/// Cross-origin configuration for browser frontends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// Storage backend selection.
///
/// Exactly one adapter is wired at startup; the `backend` tag selects it.
///
/// ```yaml
/// storage:
///   backend: s3
///   bucket: "${AWS_S3_BUCKET_NAME}"
///   region: "${AWS_REGION:-us-east-1}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    S3(S3Config),
    Cloudinary(CloudinaryConfig),
    Memory(MemoryConfig),
}

impl StorageConfig {
    /// Provider label used in logs and metrics
    pub fn provider(&self) -> &'static str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::Cloudinary(_) => "cloudinary",
            StorageConfig::Memory(_) => "memory",
        }
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, RustFS). Enables path-style addressing.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Write objects with the `public-read` canned ACL
    #[serde(default = "default_public_read")]
    pub public_read: bool,
    /// Override for the returned object URL base, e.g. a CDN domain
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_public_read() -> bool {
    true
}

/// Cloudinary backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_cloudinary_api")]
    pub api_base_url: String,
    /// Resource type used for destroy and listing (`image`, `video`, `raw`)
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    #[serde(default)]
    pub signature_algorithm: SignatureAlgorithm,
}

fn default_cloudinary_api() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_resource_type() -> String {
    "image".to_string()
}

/// Digest used for Cloudinary request signatures. Must match the account setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

/// In-process backend for local development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_base_url")]
    pub public_base_url: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_memory_base_url(),
        }
    }
}

fn default_memory_base_url() -> String {
    "http://localhost:3001/files".to_string()
}

/// Storage key layout for files without an extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// `<ts>-<token>-<name>`
    #[default]
    Standard,
    /// `<ts>-<token>-.<name>`, byte-compatible with keys written by the previous service
    Legacy,
}

/// Upload policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// Maximum files accepted by one batch request
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Per-batch bound on in-flight backend writes
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_seconds: u64,
    #[serde(default)]
    pub key_format: KeyFormat,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
            max_files: default_max_files(),
            batch_concurrency: default_batch_concurrency(),
            signed_url_ttl_seconds: default_signed_url_ttl(),
            key_format: KeyFormat::default(),
        }
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_allowed_mime_types() -> Vec<String> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_files() -> usize {
    10
}

fn default_batch_concurrency() -> usize {
    4
}

fn default_signed_url_ttl() -> u64 {
    3600
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
