//! Error types for the kannada-pdf2word library.
//!
//! Three error types, one per layer:
//!
//! * [`ConversionError`] - the request-scoped failure returned by
//!   [`crate::Converter::convert`]. Every conversion ends in exactly one
//!   artifact or exactly one of these; nothing is retried automatically.
//!
//! * [`UploadRejection`] - why [`crate::pipeline::validate`] refused an
//!   upload. Wrapped in [`ConversionError::InvalidUpload`].
//!
//! * [`OcrError`] - what an [`crate::OcrClient`] adapter reports. The scanned
//!   pipeline attaches the page number and wraps it in
//!   [`ConversionError::OcrServiceError`].

use thiserror::Error;

/// All request-level errors returned by the kannada-pdf2word library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// Upload missing, empty, not a PDF, or over the size limit.
    #[error("Invalid upload: {0}")]
    InvalidUpload(#[from] UploadRejection),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF is corrupt, encrypted, or has no usable content for the
    /// requested mode.
    #[error("Unable to read PDF: {detail}")]
    UnparsablePdf { detail: String },

    /// pdfium could not rasterise a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterizationFailure { page: usize, detail: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR service failed, timed out, or returned garbage for a page.
    #[error("OCR failed for page {page}: {source}")]
    OcrServiceError {
        page: usize,
        #[source]
        source: OcrError,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The `.docx` or `.txt` artifact could not be produced or written.
    #[error("Failed to write {artifact}: {detail}")]
    ArtifactWriteError { artifact: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Install pdfium system-wide (libpdfium.so / libpdfium.dylib / pdfium.dll).\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir-or-file to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a panicked worker, a broken invariant).
    #[error("Conversion failed: {0}")]
    Internal(String),
}

impl ConversionError {
    /// Stable machine-readable code, used in API error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUpload(_) => "INVALID_UPLOAD",
            Self::UnparsablePdf { .. } => "UNPARSABLE_PDF",
            Self::RasterizationFailure { .. } => "RASTERIZATION_FAILURE",
            Self::OcrServiceError { .. } => "OCR_SERVICE_ERROR",
            Self::ArtifactWriteError { .. } => "ARTIFACT_WRITE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::PdfiumBindingFailed(_) => "PDF_ENGINE_UNAVAILABLE",
            Self::Internal(_) => "CONVERSION_FAILED",
        }
    }

    /// Whether the caller sent something wrong, as opposed to the server
    /// or an upstream service failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUpload(_) | Self::UnparsablePdf { .. } | Self::RasterizationFailure { .. }
        )
    }

    pub(crate) fn artifact_write(artifact: impl Into<String>, detail: impl ToString) -> Self {
        Self::ArtifactWriteError {
            artifact: artifact.into(),
            detail: detail.to_string(),
        }
    }
}

/// Why an upload was refused before any PDF work started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    /// The request carried no file part.
    #[error("no file was uploaded")]
    Missing,

    #[error("the uploaded file is empty")]
    Empty,

    #[error("file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// Neither the filename nor the content type say PDF.
    #[error("'{filename}' ({content_type}) is not a PDF; only .pdf files are accepted")]
    NotPdf {
        filename: String,
        content_type: String,
    },

    /// Declared as a PDF but the `%PDF-` signature is missing.
    #[error("'{filename}' does not start with a PDF signature (first bytes: {magic:?})")]
    BadSignature { filename: String, magic: Vec<u8> },

    /// A form field other than the file had an unusable value.
    #[error("invalid value {value:?} for field '{field}'")]
    InvalidField { field: String, value: String },

    /// The upload stream broke off or exceeded the transport limit.
    #[error("upload could not be read: {0}")]
    Unreadable(String),
}

/// Errors reported by OCR service adapters.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Credentials file missing, unreadable, or of an unsupported kind.
    #[error("OCR credentials error: {0}")]
    Credentials(String),

    /// The engine binary or endpoint is not reachable at all.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Network-level failure talking to the service.
    #[error("OCR request failed: {0}")]
    Transport(String),

    /// The service answered with an error status or an error payload.
    #[error("OCR service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// The response could not be decoded.
    #[error("invalid OCR response: {0}")]
    InvalidResponse(String),

    /// No answer within the per-page deadline.
    #[error("OCR request timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl OcrError {
    /// Transient failures worth another attempt when retries are enabled.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for OcrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timed out: {err}"))
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
