//! API request handlers.

use super::error::ApiError;
use super::AppState;
use crate::analyze::TextLayerAnalysis;
use crate::error::{ConversionError, UploadRejection};
use crate::request::{ConversionMode, ConversionRequest, OutputFormat, UploadedFile};
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Response header carrying the number of converted pages.
pub const PAGE_COUNT_HEADER: &str = "x-page-count";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Fields of a convert/analyze form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    mode: Option<String>,
    format: Option<String>,
    title: Option<String>,
    author: Option<String>,
    password: Option<String>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let rejection = UploadRejection::Unreadable(e.body_text());
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(status, "INVALID_UPLOAD", rejection.to_string())
    } else {
        ApiError::from(ConversionError::from(rejection))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(UploadedFile::new(bytes.to_vec(), filename, content_type));
            }
            "mode" | "format" | "title" | "author" | "password" => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                match name.as_str() {
                    "mode" => form.mode = value,
                    "format" => form.format = value,
                    "title" => form.title = value,
                    "author" => form.author = value,
                    _ => form.password = value,
                }
            }
            other => {
                tracing::debug!("Ignoring form field '{}'", other);
            }
        }
    }
    Ok(form)
}

/// Turn a parsed form into a request. Missing `mode`/`format` take their
/// defaults; unknown values are rejected.
fn into_request(form: UploadForm) -> Result<ConversionRequest, ConversionError> {
    let file = form.file.ok_or(UploadRejection::Missing)?;
    let mode = match form.mode {
        Some(m) => m.parse::<ConversionMode>()?,
        None => ConversionMode::default(),
    };
    let format = match form.format {
        Some(f) => f.parse::<OutputFormat>()?,
        None => OutputFormat::default(),
    };
    let mut request = ConversionRequest::new(file, mode, format);
    request.title = form.title;
    request.author = form.author;
    request.password = form.password;
    Ok(request)
}

/// `Content-Disposition` for a possibly non-ASCII filename: an ASCII
/// fallback plus the RFC 5987 `filename*` form.
pub fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Convert endpoint handler.
///
/// POST /api/v1/convert
///
/// The conversion runs in its own task so a panic anywhere in the pipeline
/// becomes a `500` for this request only.
pub async fn convert_handler(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let request = into_request(form)?;

    let converter = state.converter.clone();
    let result = tokio::spawn(async move { converter.convert(request).await })
        .await
        .map_err(|e| ConversionError::Internal(format!("conversion task failed: {e}")))??;

    let content_type = HeaderValue::from_static(result.mime_type());
    let disposition = content_disposition(&result.artifact_filename);
    let pages = HeaderValue::from(result.stats.total_pages);
    let headers: [(HeaderName, HeaderValue); 3] = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, disposition),
        (HeaderName::from_static(PAGE_COUNT_HEADER), pages),
    ];
    Ok((StatusCode::OK, headers, result.artifact_bytes).into_response())
}

/// Analyze endpoint handler.
///
/// POST /api/v1/analyze
pub async fn analyze_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TextLayerAnalysis>, ApiError> {
    let form = read_form(multipart).await?;
    let file = form.file.ok_or(ConversionError::from(UploadRejection::Missing))?;
    let password = form.password;

    let converter = state.converter.clone();
    let analysis = tokio::spawn(async move { converter.analyze(file, password).await })
        .await
        .map_err(|e| ConversionError::Internal(format!("analysis task failed: {e}")))??;
    Ok(Json(analysis))
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
