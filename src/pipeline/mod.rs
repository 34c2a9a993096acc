//! Pipeline stages for PDF-to-Word conversion.
//!
//! Each submodule implements exactly one step, independently testable.
//!
//! ## Data Flow
//!
//! ```text
//!                         ┌─▶ digital ─────────────────────────┐
//! validate ──▶ workspace ─┤                                    ├─▶ postprocess ──▶ builder
//! (upload)     (staging)  └─▶ scanned ──▶ encode ──▶ ocr ──────┘    (cleanup)      (docx/txt)
//!                             (pdfium)    (png)      (service)
//! ```
//!
//! 1. [`validate`]  - reject bad uploads before any PDF work
//! 2. [`workspace`] - per-request temp directory, removed on drop
//! 3. [`pdf`]       - pdfium access behind the blocking [`pdf::PdfBackend`] trait
//! 4. [`digital`] / [`scanned`] - the two [`TextSource`]s
//! 5. [`encode`]    - grayscale/downscale/PNG for OCR
//! 6. [`ocr`]       - OCR service adapters and the per-page call policy
//! 7. [`postprocess`] - deterministic text cleanup
//! 8. [`builder`] / [`docx`] - artifact assembly

pub mod builder;
pub mod digital;
pub mod docx;
pub mod encode;
pub mod ocr;
pub mod pdf;
pub mod postprocess;
pub mod scanned;
pub mod validate;
pub mod workspace;

use crate::error::ConversionError;
use crate::output::RecognizedText;
use crate::request::ConversionMode;
use async_trait::async_trait;
use std::path::PathBuf;

/// A PDF staged on disk, ready for a [`TextSource`].
#[derive(Debug, Clone)]
pub struct StagedPdf {
    pub path: PathBuf,
    pub password: Option<String>,
    pub page_count: usize,
    /// Request workspace; intermediate files go here.
    pub scratch_dir: PathBuf,
}

/// What a [`TextSource`] hands back.
#[derive(Debug, Clone)]
pub struct SourceOutput {
    pub text: RecognizedText,
    /// OCR requests issued, retries included.
    pub ocr_calls: usize,
}

/// Produces per-page text for a staged PDF. One implementation per
/// [`ConversionMode`].
#[async_trait]
pub trait TextSource: Send + Sync {
    fn mode(&self) -> ConversionMode;

    /// Return exactly `pdf.page_count` entries, in page order.
    async fn produce(&self, pdf: &StagedPdf) -> Result<SourceOutput, ConversionError>;
}
