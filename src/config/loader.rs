//! Configuration loader with environment variable expansion

use super::{
    CloudinaryConfig, Config, ConfigError, CorsConfig, MemoryConfig, MetricsConfig, S3Config,
    ServerConfig, SignatureAlgorithm, StorageConfig, UploadConfig,
};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

/// Bucket used when `AWS_S3_BUCKET_NAME` is unset. Local development only.
pub const FALLBACK_BUCKET: &str = "ray-gallery-bucket";

/// Origins allowed by default when configuring from the environment
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:3002",
    "http://localhost:5173",
];

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_PLACEHOLDER: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static pattern");
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding environment placeholders first
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content, |name| std::env::var(name).ok());
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Recognised variables:
    /// - `STORAGE_BACKEND` - `s3` (default), `cloudinary` or `memory`
    /// - `AWS_S3_BUCKET_NAME`, `AWS_REGION`, `AWS_ENDPOINT_URL`,
    ///   `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_S3_PUBLIC_URL`
    /// - `CLOUDINARY_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`
    /// - `PORT` (default 3001), `FRONTEND_URL`
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let backend = var("STORAGE_BACKEND").unwrap_or_else(|| "s3".to_string());
        let storage = match backend.to_lowercase().as_str() {
            "s3" => {
                let bucket = var("AWS_S3_BUCKET_NAME").unwrap_or_else(|| {
                    tracing::warn!(
                        bucket = FALLBACK_BUCKET,
                        "AWS_S3_BUCKET_NAME not set, using development fallback bucket"
                    );
                    FALLBACK_BUCKET.to_string()
                });
                StorageConfig::S3(S3Config {
                    bucket,
                    region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    endpoint: var("AWS_ENDPOINT_URL"),
                    access_key: var("AWS_ACCESS_KEY_ID"),
                    secret_key: var("AWS_SECRET_ACCESS_KEY"),
                    public_read: true,
                    public_base_url: var("AWS_S3_PUBLIC_URL"),
                })
            }
            "cloudinary" => {
                let required = |name: &str| {
                    var(name).ok_or_else(|| {
                        ConfigError::ValidationError(format!(
                            "{} must be set for the cloudinary backend",
                            name
                        ))
                    })
                };
                StorageConfig::Cloudinary(CloudinaryConfig {
                    cloud_name: required("CLOUDINARY_NAME")?,
                    api_key: required("CLOUDINARY_API_KEY")?,
                    api_secret: required("CLOUDINARY_API_SECRET")?,
                    api_base_url: "https://api.cloudinary.com".to_string(),
                    resource_type: "image".to_string(),
                    signature_algorithm: SignatureAlgorithm::default(),
                })
            }
            "memory" => StorageConfig::Memory(MemoryConfig::default()),
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown STORAGE_BACKEND '{}': must be 's3', 'cloudinary', or 'memory'",
                    other
                )))
            }
        };

        let port: u16 = match var("PORT") {
            Some(p) => p.parse().map_err(|_| {
                ConfigError::ValidationError(format!("Invalid PORT '{}'", p))
            })?,
            None => 3001,
        };

        let mut allowed_origins: Vec<String> = DEV_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(frontend) = var("FRONTEND_URL") {
            allowed_origins.push(frontend);
        }

        let config = Config {
            server: ServerConfig {
                address: format!("0.0.0.0:{}", port),
                cors: CorsConfig { allowed_origins },
                ..ServerConfig::default()
            },
            storage,
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR_NAME}` and `${VAR_NAME:-default}` placeholders.
    ///
    /// A placeholder whose variable is unset and has no default is kept
    /// verbatim so validation can report it.
    fn expand_env_vars<F>(content: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut last_match = 0;
        let mut result = String::with_capacity(content.len());

        for cap in ENV_PLACEHOLDER.captures_iter(content) {
            let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            result.push_str(&content[last_match..full_match.start()]);

            let value = match lookup(var_name.as_str()) {
                Some(val) => val,
                None => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => full_match.as_str().to_string(),
                },
            };
            result.push_str(&value);

            last_match = full_match.end();
        }

        result.push_str(&content[last_match..]);
        result
    }
}
