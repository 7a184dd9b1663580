//! Gateway API Router
//!
//! Parses incoming requests into [`Route`]s. All upload routes live under the
//! configured global prefix (default `/api`); the metrics endpoint and the
//! bare `/health` probe do not.
//!
//! | Method | Path | Route |
//! |--------|------|-------|
//! | POST | `{prefix}/upload/file` | [`Route::UploadFile`] |
//! | POST | `{prefix}/upload/multiple` | [`Route::UploadMultiple`] |
//! | DELETE | `{prefix}/upload/file/{key}` | [`Route::DeleteFile`] |
//! | GET | `{prefix}/upload/signed-url/{key}?expiresIn=N` | [`Route::SignedUrl`] |
//! | GET | `{prefix}/upload/files?category=C` | [`Route::ListFiles`] |
//! | GET | `{prefix}/upload/health`, `/health` | [`Route::Health`] |
//! | GET | `{metrics.path}` | [`Route::Metrics`] |
//! | OPTIONS | any | [`Route::Preflight`] |
//!
//! Keys are everything after the route segment, percent-decoded, so both
//! `a%2Fb.png` and `a/b.png` address the key `a/b.png`.

use crate::config::{MetricsConfig, ServerConfig};
use crate::storage::MAX_SIGNED_URL_TTL_SECS;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq)]
pub enum RouterError {
    #[error("Cannot {method} {path}")]
    NotFound { method: String, path: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Gateway operations
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// GET /upload/health
    Health,
    /// GET {metrics.path}
    Metrics,
    /// OPTIONS *
    Preflight,
    /// POST /upload/file
    UploadFile,
    /// POST /upload/multiple
    UploadMultiple,
    /// DELETE /upload/file/{key}
    DeleteFile { key: String },
    /// GET /upload/signed-url/{key}
    SignedUrl {
        key: String,
        expires_in: Option<Duration>,
    },
    /// GET /upload/files
    ListFiles { category: Option<String> },
}

impl Route {
    /// Short operation name for spans and logs
    pub fn name(&self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::Metrics => "metrics",
            Route::Preflight => "preflight",
            Route::UploadFile => "upload_file",
            Route::UploadMultiple => "upload_multiple",
            Route::DeleteFile { .. } => "delete_file",
            Route::SignedUrl { .. } => "signed_url",
            Route::ListFiles { .. } => "list_files",
        }
    }
}

/// Request router
#[derive(Debug, Clone)]
pub struct RequestRouter {
    prefix: String,
    metrics_path: Option<String>,
}

impl RequestRouter {
    pub fn new(server: &ServerConfig, metrics: &MetricsConfig) -> Self {
        Self {
            prefix: server.path_prefix.trim_end_matches('/').to_string(),
            metrics_path: metrics.enabled.then(|| metrics.path.clone()),
        }
    }

    /// Parse a request line into a route
    pub fn route(&self, method: &str, path: &str, query: Option<&str>) -> Result<Route, RouterError> {
        let not_found = || RouterError::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        };

        if method == "OPTIONS" {
            return Ok(Route::Preflight);
        }

        if method == "GET" {
            if self.metrics_path.as_deref() == Some(path) {
                return Ok(Route::Metrics);
            }
            if path == "/health" {
                return Ok(Route::Health);
            }
        }

        let rest = path.strip_prefix(self.prefix.as_str()).ok_or_else(not_found)?;
        let rest = rest.strip_prefix("/upload/").ok_or_else(not_found)?;
        let params = Self::parse_query(query)?;

        match (method, rest) {
            ("GET", "health") => Ok(Route::Health),
            ("POST", "file") => Ok(Route::UploadFile),
            ("POST", "multiple") => Ok(Route::UploadMultiple),
            ("GET", "files") => Ok(Route::ListFiles {
                category: params.get("category").filter(|c| !c.is_empty()).cloned(),
            }),
            ("DELETE", _) if rest.starts_with("file/") => Ok(Route::DeleteFile {
                key: Self::decode_key(&rest["file/".len()..])?,
            }),
            ("GET", _) if rest.starts_with("signed-url/") => {
                let expires_in = match params.get("expiresIn") {
                    None => None,
                    Some(raw) => match raw.parse::<u64>() {
                        Ok(secs) if secs > 0 && secs <= MAX_SIGNED_URL_TTL_SECS => {
                            Some(Duration::from_secs(secs))
                        }
                        _ => {
                            return Err(RouterError::InvalidQuery(format!(
                                "expiresIn must be an integer between 1 and {}, got '{}'",
                                MAX_SIGNED_URL_TTL_SECS, raw
                            )))
                        }
                    },
                };
                Ok(Route::SignedUrl {
                    key: Self::decode_key(&rest["signed-url/".len()..])?,
                    expires_in,
                })
            }
            _ => Err(not_found()),
        }
    }

    fn decode_key(raw: &str) -> Result<String, RouterError> {
        if raw.is_empty() {
            return Err(RouterError::InvalidPath("Missing key".into()));
        }
        percent_decode_str(raw)
            .decode_utf8()
            .map(|k| k.into_owned())
            .map_err(|_| RouterError::InvalidPath("Key is not valid UTF-8".into()))
    }

    fn parse_query(query: Option<&str>) -> Result<HashMap<String, String>, RouterError> {
        let mut params = HashMap::new();
        let Some(q) = query else {
            return Ok(params);
        };
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let value = percent_decode_str(&value)
                .decode_utf8()
                .map_err(|_| RouterError::InvalidQuery(format!("{} is not valid UTF-8", key)))?;
            params.insert(key.to_string(), value.into_owned());
        }
        Ok(params)
    }
}
