//! # kannada-pdf2word
//!
//! Convert Kannada PDF documents to Word (`.docx`) or plain text.
//!
//! ## Why this crate?
//!
//! Kannada PDFs come in two flavours. Born-digital files carry a Unicode text
//! layer that only needs to be read out and re-flowed. Scanned files carry
//! page images, sometimes with a garbage text layer left by the scanner, and
//! need OCR with a Kannada-capable engine. Either way the result has to open
//! in Word with a font that can actually shape Kannada. This crate does both
//! paths behind one request type and guarantees the output keeps page order
//! and the exact Unicode that came in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate   size, type, %PDF- signature
//!  ├─ 2. Stage      per-request temp workspace (removed on every exit path)
//!  ├─ 3. Text       digital: pdfium text layer
//!  │                scanned: pdfium render → grayscale PNG → OCR (concurrent)
//!  ├─ 4. Clean      invisible chars, whitespace, NFC, optional legacy-font fix
//!  └─ 5. Build      .docx (Noto Sans Kannada, kn-IN) or .txt
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kannada_pdf2word::{
//!     ConversionConfig, ConversionMode, ConversionRequest, Converter, OutputFormat, UploadedFile,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::with_pdfium(ConversionConfig::from_env()?)?;
//!     let file = UploadedFile::from_path("kathe.pdf").await?;
//!     let request = ConversionRequest::new(file, ConversionMode::Digital, OutputFormat::Docx);
//!     let (path, result) = converter.convert_to_output_dir(request).await?;
//!     eprintln!("{} pages → {}", result.stats.total_pages, path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `pdf2word` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `server` | on      | The [`server`] module and `pdf2word-server` binary (axum + tower-http) |
//!
//! Library-only use:
//! ```toml
//! kannada-pdf2word = { version = "0.1", default-features = false }
//! ```
//!
//! ## OCR engines
//!
//! | Engine | Needs | Notes |
//! |--------|-------|-------|
//! | Google Cloud Vision (default) | `GOOGLE_APPLICATION_CREDENTIALS` → service-account key, or JSON with `api_key` / `access_token` | Best Kannada accuracy |
//! | Tesseract | `tesseract` on `PATH` with the `kan` traineddata | Offline |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod convert;
pub mod error;
pub mod kannada;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{PdfKind, TextLayerAnalysis, TextLayerAnalyzer};
pub use config::{
    Binarization, ConversionConfig, ConversionConfigBuilder, ImageCleanup, OcrEngine, OcrSettings,
    PageSeparator,
};
pub use convert::{write_artifact, Converter};
pub use error::{ConversionError, OcrError, UploadRejection};
pub use output::{
    ConversionResult, ConversionStage, ConversionStats, DocumentMetadata, PageText, RecognizedText,
    TextOrigin,
};
pub use pipeline::ocr::{GoogleVisionClient, OcrClient, OcrCredentials, TesseractClient};
pub use pipeline::pdf::{PdfBackend, PdfiumBackend};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{ConversionMode, ConversionRequest, OutputFormat, UploadedFile};
