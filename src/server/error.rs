//! Error responses for the HTTP API.

use crate::error::{ConversionError, UploadRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// JSON error body: `{"error": "...", "code": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        let status = match &err {
            ConversionError::InvalidUpload(UploadRejection::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ConversionError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ConversionError::UnparsablePdf { .. } | ConversionError::RasterizationFailure { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConversionError::OcrServiceError { .. } => StatusCode::BAD_GATEWAY,
            ConversionError::PdfiumBindingFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ConversionError::ArtifactWriteError { .. }
            | ConversionError::InvalidConfig(_)
            | ConversionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in the log.
        let message = match &err {
            ConversionError::Internal(detail) => {
                tracing::error!("Internal conversion error: {}", detail);
                "Conversion failed unexpectedly".to_string()
            }
            ConversionError::PdfiumBindingFailed(detail) => {
                tracing::error!("PDF engine unavailable: {}", detail);
                "PDF engine unavailable".to_string()
            }
            other => other.to_string(),
        };

        Self::new(status, err.code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, status = %self.status, "{}", self.message);
        } else {
            tracing::warn!(code = self.code, status = %self.status, "{}", self.message);
        }
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;

    #[test]
    fn upload_errors_are_client_errors() {
        let e = ApiError::from(ConversionError::from(UploadRejection::Empty));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "INVALID_UPLOAD");

        let e = ApiError::from(ConversionError::from(UploadRejection::TooLarge { size: 10, max: 5 }));
        assert_eq!(e.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn ocr_failure_is_bad_gateway() {
        let e = ApiError::from(ConversionError::OcrServiceError {
            page: 3,
            source: OcrError::Timeout { secs: 30 },
        });
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "OCR_SERVICE_ERROR");
        assert!(e.message.contains("page 3"));
    }

    #[test]
    fn internal_details_are_hidden() {
        let e = ApiError::from(ConversionError::Internal("task panicked at foo.rs:12".into()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.message.contains("foo.rs"));
    }
}
