//! Configuration Loading Tests
//!
//! File-based loading with environment expansion, and environment-only
//! configuration. Tests that touch the process environment run serially.

use media_gateway::config::{Config, ConfigError, KeyFormat, SignatureAlgorithm, StorageConfig};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn clear_env() {
    for name in [
        "STORAGE_BACKEND",
        "AWS_S3_BUCKET_NAME",
        "AWS_REGION",
        "AWS_ENDPOINT_URL",
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_S3_PUBLIC_URL",
        "CLOUDINARY_NAME",
        "CLOUDINARY_API_KEY",
        "CLOUDINARY_API_SECRET",
        "PORT",
        "FRONTEND_URL",
        "MG_TEST_BUCKET",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_load_s3_config_from_file() {
    clear_env();
    std::env::set_var("MG_TEST_BUCKET", "media-prod");

    let file = write_config(
        r#"
server:
  address: "127.0.0.1:8080"
  path_prefix: "/v1"
  cors:
    allowed_origins: ["https://app.example.com"]
storage:
  backend: s3
  bucket: "${MG_TEST_BUCKET}"
  region: "${MG_TEST_REGION:-eu-west-1}"
upload:
  max_file_size: 5242880
  key_format: legacy
  batch_concurrency: 2
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.server.address, "127.0.0.1:8080");
    assert_eq!(config.server.path_prefix, "/v1");
    assert!(config.server.cors.allows("https://app.example.com"));
    match config.storage {
        StorageConfig::S3(ref s3) => {
            assert_eq!(s3.bucket, "media-prod");
            assert_eq!(s3.region, "eu-west-1");
            assert!(s3.public_read);
        }
        ref other => panic!("unexpected storage: {:?}", other),
    }
    assert_eq!(config.upload.max_file_size, 5 * 1024 * 1024);
    assert_eq!(config.upload.key_format, KeyFormat::Legacy);
    assert_eq!(config.upload.batch_concurrency, 2);
    assert_eq!(config.upload.max_files, 10);
    assert!(config.metrics.enabled);

    clear_env();
}

#[test]
#[serial]
fn test_unset_placeholder_fails_validation() {
    clear_env();

    let file = write_config(
        r#"
storage:
  backend: cloudinary
  cloud_name: "${CLOUDINARY_NAME}"
  api_key: "key"
  api_secret: "secret"
"#,
    );

    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("CLOUDINARY_NAME"));
}

#[test]
fn test_cloudinary_defaults_from_file() {
    let file = write_config(
        r#"
storage:
  backend: cloudinary
  cloud_name: demo
  api_key: "123"
  api_secret: abc
  signature_algorithm: sha256
"#,
    );

    let config = Config::load(file.path()).unwrap();
    match config.storage {
        StorageConfig::Cloudinary(ref c) => {
            assert_eq!(c.api_base_url, "https://api.cloudinary.com");
            assert_eq!(c.resource_type, "image");
            assert_eq!(c.signature_algorithm, SignatureAlgorithm::Sha256);
        }
        ref other => panic!("unexpected storage: {:?}", other),
    }
    assert_eq!(config.server.path_prefix, "/api");
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Config::load("/nonexistent/media-gateway.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let file = write_config("storage: [unterminated");
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
#[serial]
fn test_from_env_s3_with_fallbacks() {
    clear_env();
    std::env::set_var("AWS_ACCESS_KEY_ID", "AKIA");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
    std::env::set_var("FRONTEND_URL", "https://gallery.example.com");

    let config = Config::from_env().unwrap();
    match config.storage {
        StorageConfig::S3(ref s3) => {
            assert_eq!(s3.bucket, "ray-gallery-bucket");
            assert_eq!(s3.region, "us-east-1");
            assert_eq!(s3.access_key.as_deref(), Some("AKIA"));
        }
        ref other => panic!("unexpected storage: {:?}", other),
    }
    assert_eq!(config.server.address, "0.0.0.0:3001");
    assert!(config.server.cors.allows("https://gallery.example.com"));
    assert!(config.server.cors.allows("http://localhost:5173"));

    clear_env();
}

#[test]
#[serial]
fn test_from_env_cloudinary_requires_credentials() {
    clear_env();
    std::env::set_var("STORAGE_BACKEND", "cloudinary");
    std::env::set_var("CLOUDINARY_NAME", "demo");

    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("CLOUDINARY_API_KEY"));

    std::env::set_var("CLOUDINARY_API_KEY", "123");
    std::env::set_var("CLOUDINARY_API_SECRET", "abc");
    std::env::set_var("PORT", "4000");
    let config = Config::from_env().unwrap();
    assert_eq!(config.storage.provider(), "cloudinary");
    assert_eq!(config.server.address, "0.0.0.0:4000");

    clear_env();
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_backend() {
    clear_env();
    std::env::set_var("STORAGE_BACKEND", "ftp");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::ValidationError(_))
    ));
    clear_env();
}
