//! Request handlers
//!
//! Maps each [`Route`] to a gateway call and turns the result into a JSON
//! response. Failures become `{statusCode, message, error}` bodies.
//!
//! | Failure | Status |
//! |---------|--------|
//! | `InvalidFile`, `FileTooLarge`, `UnsupportedMediaType`, bad form | 400 |
//! | `NotFound` (object or route) | 404 |
//! | body over `max_request_size` | 413 |
//! | `Unsupported` | 501 |
//! | backend and anything else | 500 |

use super::multipart::{parse_upload_form, FormError, FormLimits};
use super::AppState;
use crate::metrics;
use crate::router::{Route, RouterError};
use crate::storage::StorageError;
use crate::upload::UploadError;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::Instrument;

const ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const ALLOW_HEADERS: &str = "Content-Type,Authorization";

/// Error rendered to the client
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn into_response(self) -> Response<Full<Bytes>> {
        let body = json!({
            "statusCode": self.status.as_u16(),
            "message": self.message,
            "error": self.status.canonical_reason().unwrap_or("Error"),
        });
        json_response(self.status, &body)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        metrics::record_error(err.kind());
        let status = match &err {
            UploadError::InvalidFile(_)
            | UploadError::FileTooLarge { .. }
            | UploadError::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            UploadError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            UploadError::Storage(StorageError::Unsupported { .. }) => StatusCode::NOT_IMPLEMENTED,
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        let status = match err {
            RouterError::NotFound { .. } => StatusCode::NOT_FOUND,
            RouterError::InvalidPath(_) | RouterError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        let status = match err {
            FormError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            FormError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"statusCode":500,"message":"Internal server error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Add CORS headers when `origin` is allow-listed
fn apply_cors(response: &mut Response<Full<Bytes>>, origin: Option<&str>, state: &AppState, preflight: bool) {
    let Some(origin) = origin else { return };
    if !state.config.server.cors.allows(origin) {
        return;
    }
    let Ok(value) = HeaderValue::from_str(origin) else {
        return;
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    if preflight {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

/// Entry point for every request on a connection
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
        request_id = %request_id,
        route = tracing::field::Empty,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let route = state.router.route(
            req.method().as_str(),
            req.uri().path(),
            req.uri().query(),
        );
        let preflight = matches!(route, Ok(Route::Preflight));

        let mut response = match route {
            Ok(route) => {
                tracing::Span::current().record("route", route.name());
                match dispatch(route, req, &state).await {
                    Ok(response) => response,
                    Err(e) => e.into_response(),
                }
            }
            Err(e) => ApiError::from(e).into_response(),
        };

        apply_cors(&mut response, origin.as_deref(), &state, preflight);

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed");
        } else {
            tracing::info!(status = status.as_u16(), "Request completed");
        }

        Ok(response)
    }
    .instrument(span)
    .await
}

async fn dispatch(
    route: Route,
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ApiError> {
    match route {
        Route::Health => Ok(health()),
        Route::Metrics => render_metrics(),
        Route::Preflight => Ok(empty_response(StatusCode::NO_CONTENT)),
        Route::UploadFile => upload_file(req, state).await,
        Route::UploadMultiple => upload_multiple(req, state).await,
        Route::DeleteFile { key } => {
            state.gateway.delete_file(&key).await?;
            Ok(json_response(
                StatusCode::OK,
                &json!({ "message": "File deleted successfully" }),
            ))
        }
        Route::SignedUrl { key, expires_in } => {
            let url = state.gateway.get_signed_url(&key, expires_in).await?;
            Ok(json_response(StatusCode::OK, &json!({ "url": url })))
        }
        Route::ListFiles { category } => {
            let entries = state.gateway.list_files(category.as_deref()).await?;
            Ok(json_response(StatusCode::OK, &entries))
        }
    }
}

fn health() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "OK",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    )
}

fn render_metrics() -> Result<Response<Full<Bytes>>, ApiError> {
    let (content_type, body) = metrics::render().map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
    })?;

    let mut response = Response::new(Full::new(Bytes::from(body)));
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn read_form(
    req: Request<Incoming>,
    state: &AppState,
    file_field: &str,
    max_files: usize,
) -> Result<super::multipart::UploadForm, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let limits = FormLimits {
        file_field,
        max_files,
        max_body: state.config.server.max_request_size,
    };
    let form = parse_upload_form(content_type.as_deref(), req.into_body(), limits).await?;
    form.validate_dto()?;
    Ok(form)
}

async fn upload_file(req: Request<Incoming>, state: &AppState) -> Result<Response<Full<Bytes>>, ApiError> {
    let form = read_form(req, state, "file", 1).await?;
    let metadata = form.metadata();
    let file = form
        .files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let object = state.gateway.upload_file(file, &metadata).await?;
    Ok(json_response(StatusCode::CREATED, &object))
}

async fn upload_multiple(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ApiError> {
    let form = read_form(req, state, "files", state.config.upload.max_files).await?;
    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let metadata = form.metadata();
    let objects = state
        .gateway
        .upload_multiple_files(form.files, &metadata)
        .await?;
    Ok(json_response(StatusCode::CREATED, &objects))
}
