//! Multipart form parsing
//!
//! Collects a size-limited request body and splits it with `multer` into
//! uploaded files plus the `filename`/`description`/`category` text fields.
//! Any other text field is rejected, as is a file under an unexpected name.

use crate::upload::{UploadMetadata, UploadedFile};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use std::convert::Infallible;
use thiserror::Error;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Form parsing errors
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    BadRequest(String),
}

/// A parsed upload form
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub filename: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl UploadForm {
    /// Require the `filename` field to be present and non-empty
    pub fn validate_dto(&self) -> Result<(), FormError> {
        match self.filename.as_deref() {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(FormError::BadRequest("filename should not be empty".into())),
        }
    }

    pub fn metadata(&self) -> UploadMetadata {
        UploadMetadata {
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

/// Limits applied while reading a form
#[derive(Debug, Clone, Copy)]
pub struct FormLimits<'a> {
    /// Name of the field carrying files
    pub file_field: &'a str,
    pub max_files: usize,
    pub max_body: usize,
}

/// Read and parse a multipart body.
///
/// A request without a multipart content type yields an empty form.
pub async fn parse_upload_form<B>(
    content_type: Option<&str>,
    body: B,
    limits: FormLimits<'_>,
) -> Result<UploadForm, FormError>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let data = match Limited::new(body, limits.max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(FormError::PayloadTooLarge(limits.max_body))
        }
        Err(e) => return Err(FormError::BadRequest(format!("Failed to read body: {}", e))),
    };

    let boundary = match content_type.map(multer::parse_boundary) {
        Some(Ok(boundary)) => boundary,
        _ => return Ok(UploadForm::default()),
    };

    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(data) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            if name != limits.file_field {
                return Err(FormError::BadRequest(format!("Unexpected field '{}'", name)));
            }
            if form.files.len() >= limits.max_files {
                return Err(FormError::BadRequest(format!(
                    "Too many files; at most {} allowed",
                    limits.max_files
                )));
            }
            // Declared type is validated as sent, parameters included
            let mime_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
            let data = field.bytes().await.map_err(bad_request)?;
            form.files.push(UploadedFile::new(file_name, mime_type, data));
            continue;
        }

        let value = field.text().await.map_err(bad_request)?;
        match name.as_str() {
            "filename" => form.filename = Some(value),
            "description" => form.description = Some(value),
            "category" => form.category = Some(value),
            other => {
                return Err(FormError::BadRequest(format!(
                    "property {} should not exist",
                    other
                )))
            }
        }
    }

    Ok(form)
}

fn bad_request(err: multer::Error) -> FormError {
    FormError::BadRequest(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    const BOUNDARY: &str = "X-BOUNDARY";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        )
    }

    fn file_part(name: &str, file_name: &str, mime: &str, data: &str) -> String {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n{}\r\n",
            BOUNDARY, name, file_name, mime, data
        )
    }

    fn body(parts: &[String]) -> Full<Bytes> {
        let mut raw = parts.concat();
        raw.push_str(&format!("--{}--\r\n", BOUNDARY));
        Full::new(Bytes::from(raw))
    }

    fn limits(max_files: usize) -> FormLimits<'static> {
        FormLimits {
            file_field: "file",
            max_files,
            max_body: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn test_parses_file_and_fields() {
        let body = body(&[
            text_part("filename", "photo.png"),
            text_part("category", "products"),
            file_part("file", "photo.png", "image/png", "PNGDATA"),
        ]);
        let form = parse_upload_form(Some(&content_type()), body, limits(1))
            .await
            .unwrap();

        assert_eq!(form.files.len(), 1);
        assert_eq!(form.files[0].filename, "photo.png");
        assert_eq!(form.files[0].mime_type, "image/png");
        assert_eq!(form.files[0].size, 7);
        assert_eq!(form.metadata().category.as_deref(), Some("products"));
        assert!(form.validate_dto().is_ok());
    }

    #[tokio::test]
    async fn test_mime_parameters_are_kept() {
        let body = body(&[
            text_part("filename", "notes.txt"),
            file_part("file", "notes.txt", "text/plain; charset=utf-8", "hi"),
        ]);
        let form = parse_upload_form(Some(&content_type()), body, limits(1))
            .await
            .unwrap();

        assert_eq!(form.files[0].mime_type, "text/plain; charset=utf-8");
        let policy = crate::upload::UploadPolicy::default();
        assert!(matches!(
            policy.validate(&form.files[0]),
            Err(crate::upload::UploadError::UnsupportedMediaType(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let body = body(&[text_part("owner", "me")]);
        let err = parse_upload_form(Some(&content_type()), body, limits(1))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "property owner should not exist");
    }

    #[tokio::test]
    async fn test_too_many_files_rejected() {
        let body = body(&[
            file_part("file", "a.txt", "text/plain", "a"),
            file_part("file", "b.txt", "text/plain", "b"),
        ]);
        let result = parse_upload_form(Some(&content_type()), body, limits(1)).await;
        assert!(matches!(result, Err(FormError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let body = body(&[file_part("file", "a.txt", "text/plain", &"x".repeat(4096))]);
        let limits = FormLimits {
            max_body: 1024,
            ..limits(1)
        };
        let result = parse_upload_form(Some(&content_type()), body, limits).await;
        assert!(matches!(result, Err(FormError::PayloadTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_non_multipart_is_empty_form() {
        let form = parse_upload_form(
            Some("application/json"),
            Full::new(Bytes::from("{}")),
            limits(1),
        )
        .await
        .unwrap();
        assert!(form.files.is_empty());
        assert!(form.validate_dto().is_err());
    }
}
